//! Turns an event's city and master id into concrete destinations.

use std::sync::Arc;

use serde::Serialize;

use courier_common::types::{DirectorRecord, MasterRecord, RecipientType};

use crate::error::DispatchError;
use crate::store::RecipientStore;

/// A person a notification may be addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub recipient_type: RecipientType,
    pub id: i64,
    pub name: String,
}

/// A recipient together with the channel address to send to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub recipient: Recipient,
    pub channel_address: String,
}

/// Directors serving a city, split by whether they can be reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorDestinations {
    pub reachable: Vec<Destination>,
    pub unreachable: Vec<Recipient>,
}

impl DirectorDestinations {
    pub fn is_empty(&self) -> bool {
        self.reachable.is_empty() && self.unreachable.is_empty()
    }
}

#[derive(Clone)]
pub struct RecipientResolver {
    store: Arc<dyn RecipientStore>,
}

impl RecipientResolver {
    pub fn new(store: Arc<dyn RecipientStore>) -> Self {
        Self { store }
    }

    /// All directors whose city list contains `city`.
    pub async fn resolve_directors(&self, city: &str) -> Result<DirectorDestinations, DispatchError> {
        let city = city.trim();
        if city.is_empty() {
            return Ok(DirectorDestinations::default());
        }

        let directors = self.store.find_directors_by_city(city).await?;
        let mut destinations = DirectorDestinations::default();

        for director in directors {
            let (recipient, address) = split_director(director);
            match address {
                Some(channel_address) => destinations.reachable.push(Destination {
                    recipient,
                    channel_address,
                }),
                None => destinations.unreachable.push(recipient),
            }
        }

        tracing::debug!(
            city,
            reachable = destinations.reachable.len(),
            unreachable = destinations.unreachable.len(),
            "Resolved directors"
        );

        Ok(destinations)
    }

    pub async fn resolve_master(&self, master_id: i64) -> Result<Destination, DispatchError> {
        let master = self
            .store
            .find_master_by_id(master_id)
            .await?
            .ok_or(DispatchError::RecipientNotFound {
                recipient_type: RecipientType::Master,
                id: master_id,
            })?;

        let (recipient, address) = split_master(master);
        match address {
            Some(channel_address) => Ok(Destination {
                recipient,
                channel_address,
            }),
            None => Err(DispatchError::RecipientUnreachable {
                recipient_type: RecipientType::Master,
                id: recipient.id,
                name: recipient.name,
            }),
        }
    }
}

fn usable_address(address: Option<String>) -> Option<String> {
    address
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
}

fn split_director(director: DirectorRecord) -> (Recipient, Option<String>) {
    let recipient = Recipient {
        recipient_type: RecipientType::Director,
        id: director.id,
        name: director.name,
    };
    (recipient, usable_address(director.channel_address))
}

fn split_master(master: MasterRecord) -> (Recipient, Option<String>) {
    let recipient = Recipient {
        recipient_type: RecipientType::Master,
        id: master.id,
        name: master.name,
    };
    (recipient, usable_address(master.channel_address))
}
