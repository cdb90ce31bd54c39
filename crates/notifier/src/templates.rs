//! Template registry: maps each event kind to its recipient policy and renderer.
//!
//! Renderers are total: every field is optional, missing values become the
//! [`NOT_SPECIFIED`] placeholder, and date fields are normalized through
//! [`crate::format`].

use chrono_tz::Tz;
use serde::Serialize;

use crate::error::DispatchError;
use crate::event::{
    CloseOrderReminder, DateChange, EventDetails, EventKind, MasterAssigned,
    ModernClosingReminder, NewOrder, OrderAccepted, OrderCard, OrderClosed, OrderInModern,
    OrderRejection,
};
use crate::format::{
    DEFAULT_EQUIPMENT, NOT_SPECIFIED, display_date, display_datetime, escape_html, or_default,
    or_placeholder,
};

/// Which resolver branches an event kind activates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientPolicy {
    Director,
    Master,
    Both,
}

impl RecipientPolicy {
    pub fn includes_directors(&self) -> bool {
        matches!(self, RecipientPolicy::Director | RecipientPolicy::Both)
    }

    pub fn includes_master(&self) -> bool {
        matches!(self, RecipientPolicy::Master | RecipientPolicy::Both)
    }
}

/// Inputs a renderer sees besides the typed details.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub order_id: i64,
    /// Set for director renders only.
    pub city: Option<&'a str>,
    pub timezone: Tz,
}

pub type Renderer = fn(&RenderContext<'_>, &EventDetails) -> String;

/// Recipient policy and renderer for one event kind.
#[derive(Clone, Copy)]
pub struct Template {
    pub kind: EventKind,
    pub policy: RecipientPolicy,
    /// Attach an "open order" button to the master's copy.
    pub master_link: bool,
    render: Renderer,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("kind", &self.kind)
            .field("policy", &self.policy)
            .field("master_link", &self.master_link)
            .finish_non_exhaustive()
    }
}

impl Template {
    pub fn render(&self, ctx: &RenderContext<'_>, details: &EventDetails) -> String {
        (self.render)(ctx, details)
    }
}

/// Indexed by `kind_index`.
static TEMPLATES: [Template; 10] = [
    Template {
        kind: EventKind::NewOrder,
        policy: RecipientPolicy::Director,
        master_link: false,
        render: render_new_order,
    },
    Template {
        kind: EventKind::DateChange,
        policy: RecipientPolicy::Both,
        master_link: false,
        render: render_date_change,
    },
    Template {
        kind: EventKind::OrderRejection,
        policy: RecipientPolicy::Both,
        master_link: false,
        render: render_order_rejection,
    },
    Template {
        kind: EventKind::MasterAssigned,
        policy: RecipientPolicy::Master,
        master_link: true,
        render: render_master_assigned,
    },
    Template {
        kind: EventKind::MasterReassigned,
        policy: RecipientPolicy::Master,
        master_link: false,
        render: render_master_reassigned,
    },
    Template {
        kind: EventKind::OrderAccepted,
        policy: RecipientPolicy::Master,
        master_link: false,
        render: render_order_accepted,
    },
    Template {
        kind: EventKind::OrderClosed,
        policy: RecipientPolicy::Master,
        master_link: false,
        render: render_order_closed,
    },
    Template {
        kind: EventKind::OrderInModern,
        policy: RecipientPolicy::Master,
        master_link: false,
        render: render_order_in_modern,
    },
    Template {
        kind: EventKind::CloseOrderReminder,
        policy: RecipientPolicy::Master,
        master_link: true,
        render: render_close_order_reminder,
    },
    Template {
        kind: EventKind::ModernClosingReminder,
        policy: RecipientPolicy::Master,
        master_link: true,
        render: render_modern_closing_reminder,
    },
];

fn kind_index(kind: EventKind) -> usize {
    match kind {
        EventKind::NewOrder => 0,
        EventKind::DateChange => 1,
        EventKind::OrderRejection => 2,
        EventKind::MasterAssigned => 3,
        EventKind::MasterReassigned => 4,
        EventKind::OrderAccepted => 5,
        EventKind::OrderClosed => 6,
        EventKind::OrderInModern => 7,
        EventKind::CloseOrderReminder => 8,
        EventKind::ModernClosingReminder => 9,
    }
}

/// Static registry of message templates.
pub struct TemplateRegistry;

impl TemplateRegistry {
    /// Look up a template by wire name.
    pub fn resolve(name: &str) -> Result<&'static Template, DispatchError> {
        let kind: EventKind = name.parse()?;
        Ok(Self::template(kind))
    }

    /// Template for a typed kind.
    pub fn template(kind: EventKind) -> &'static Template {
        &TEMPLATES[kind_index(kind)]
    }
}

// ───────────────────────────── decision tables ──────────────────────────────

/// Rejection reason recorded by operators when the lead was never a real order.
const NON_ORDER_REASON: &str = "незаказ";

/// How a rejection is headlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// Lead turned out not to be an order at all.
    NonOrder,
    /// Any other cancellation.
    Cancelled,
}

impl RejectionReason {
    pub fn classify(reason: Option<&str>) -> Self {
        match reason.map(|r| r.trim().to_lowercase()) {
            Some(r) if r == NON_ORDER_REASON => RejectionReason::NonOrder,
            _ => RejectionReason::Cancelled,
        }
    }

    fn headline(&self, order_id: i64) -> String {
        match self {
            RejectionReason::NonOrder => format!("🚫 Заказ №{}: незаказ", order_id),
            RejectionReason::Cancelled => format!("❌ Заказ №{} Отменен", order_id),
        }
    }
}

/// Where a modern order stands relative to its closing date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosingDue {
    Overdue(i64),
    Today,
    Undated,
    Remaining(i64),
}

impl ClosingDue {
    pub fn classify(days_until_closing: i64, has_closing_date: bool) -> Self {
        if days_until_closing < 0 {
            ClosingDue::Overdue(-days_until_closing)
        } else if !has_closing_date {
            ClosingDue::Undated
        } else if days_until_closing == 0 {
            ClosingDue::Today
        } else {
            ClosingDue::Remaining(days_until_closing)
        }
    }

    fn line(&self) -> String {
        match self {
            ClosingDue::Overdue(days) => format!("⚠️ Просрочено на {} дн.", days),
            ClosingDue::Today => "⏰ Сегодня день закрытия!".to_string(),
            ClosingDue::Undated => "⚠️ Нужно закрыть модерн!".to_string(),
            ClosingDue::Remaining(days) => format!("⏰ Осталось дней: {}", days),
        }
    }
}

// ───────────────────────────── renderers ──────────────────────────────

fn card_lines(card: &OrderCard) -> String {
    format!(
        "РК: {}\nАвито: {}\nНаправление: {}",
        or_placeholder(card.rk.as_deref()),
        or_placeholder(card.avito_name.as_deref()),
        or_default(card.type_equipment.as_deref(), DEFAULT_EQUIPMENT),
    )
}

fn datetime_or_placeholder(value: Option<&str>, tz: Tz) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => escape_html(&display_datetime(v, tz)),
        None => NOT_SPECIFIED.to_string(),
    }
}

fn date_or_placeholder(value: Option<&str>, tz: Tz) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => escape_html(&display_date(v, tz)),
        None => NOT_SPECIFIED.to_string(),
    }
}

fn city_suffix(ctx: &RenderContext<'_>) -> String {
    match ctx.city {
        Some(city) => format!("\n🏙 Город: {}", escape_html(city)),
        None => String::new(),
    }
}

fn render_new_order(ctx: &RenderContext<'_>, details: &EventDetails) -> String {
    let fallback = NewOrder::default();
    let f = match details {
        EventDetails::NewOrder(f) => f,
        _ => &fallback,
    };
    format!(
        "🆕 Поступил новый заказ №{}\n\n{}\n\n👤 Клиент: {}\n📞 Телефон: {}\n📍 Адрес: {}\n🗓 Дата встречи: {}\n🔧 Проблема: {}\n🏙 Город: {}",
        ctx.order_id,
        card_lines(&f.card),
        or_placeholder(f.client_name.as_deref()),
        or_placeholder(f.phone.as_deref()),
        or_placeholder(f.address.as_deref()),
        datetime_or_placeholder(f.date_meeting.as_deref(), ctx.timezone),
        or_placeholder(f.problem.as_deref()),
        or_placeholder(ctx.city),
    )
}

fn render_date_change(ctx: &RenderContext<'_>, details: &EventDetails) -> String {
    let fallback = DateChange::default();
    let f = match details {
        EventDetails::DateChange(f) => f,
        _ => &fallback,
    };
    let new_date = datetime_or_placeholder(f.new_date.as_deref(), ctx.timezone);
    format!(
        "📅 Заказ №{} перенесен на {}\n\n{}\n\n👤 Клиент: {}\n🗓 Дата встречи: {}\n🗓 Прежняя дата: {}{}",
        ctx.order_id,
        new_date,
        card_lines(&f.card),
        or_placeholder(f.client_name.as_deref()),
        new_date,
        datetime_or_placeholder(f.old_date.as_deref(), ctx.timezone),
        city_suffix(ctx),
    )
}

fn render_order_rejection(ctx: &RenderContext<'_>, details: &EventDetails) -> String {
    let fallback = OrderRejection::default();
    let f = match details {
        EventDetails::OrderRejection(f) => f,
        _ => &fallback,
    };
    let headline = RejectionReason::classify(f.reason.as_deref()).headline(ctx.order_id);
    format!(
        "{}\n\n{}\n\n👤 Клиент: {}\n🗓 Дата встречи: {}\n💬 Причина: {}{}",
        headline,
        card_lines(&f.card),
        or_placeholder(f.client_name.as_deref()),
        datetime_or_placeholder(f.date_meeting.as_deref(), ctx.timezone),
        or_placeholder(f.reason.as_deref()),
        city_suffix(ctx),
    )
}

fn render_master_assigned(ctx: &RenderContext<'_>, details: &EventDetails) -> String {
    let fallback = MasterAssigned::default();
    let f = match details {
        EventDetails::MasterAssigned(f) => f,
        _ => &fallback,
    };
    format!(
        "👷 Вам назначен заказ №{}\n\n{}\n\n👤 Клиент: {}\n📍 Адрес: {}\n🗓 Дата встречи: {}\n\n⚠️ Подтвердите принятие заказа!",
        ctx.order_id,
        card_lines(&f.card),
        or_placeholder(f.client_name.as_deref()),
        or_placeholder(f.address.as_deref()),
        datetime_or_placeholder(f.date_meeting.as_deref(), ctx.timezone),
    )
}

fn render_master_reassigned(ctx: &RenderContext<'_>, _details: &EventDetails) -> String {
    format!("🔄 Заказ №{} передан другому мастеру", ctx.order_id)
}

fn render_order_accepted(ctx: &RenderContext<'_>, details: &EventDetails) -> String {
    let fallback = OrderAccepted::default();
    let f = match details {
        EventDetails::OrderAccepted(f) => f,
        _ => &fallback,
    };
    format!(
        "✅ Заказ №{} принят\n\n{}\n\n👤 Клиент: {}\n📞 Телефон: {}\n📍 Адрес: {}\n🗓 Дата встречи: {}",
        ctx.order_id,
        card_lines(&f.card),
        or_placeholder(f.client_name.as_deref()),
        or_placeholder(f.phone.as_deref()),
        or_placeholder(f.address.as_deref()),
        datetime_or_placeholder(f.date_meeting.as_deref(), ctx.timezone),
    )
}

fn render_order_closed(ctx: &RenderContext<'_>, details: &EventDetails) -> String {
    let fallback = OrderClosed::default();
    let f = match details {
        EventDetails::OrderClosed(f) => f,
        _ => &fallback,
    };
    format!(
        "🔒 Заказ №{} закрыт\n\n👤 Клиент: {}\n📅 Дата закрытия: {}\n\n💰 Итог: {}\n📉 Расход: {}\n💵 Чистыми: {}\n🔄 Сдача мастера: {}",
        ctx.order_id,
        or_placeholder(f.client_name.as_deref()),
        datetime_or_placeholder(f.closing_date.as_deref(), ctx.timezone),
        or_placeholder(f.total.as_deref()),
        or_placeholder(f.expense.as_deref()),
        or_placeholder(f.net.as_deref()),
        or_placeholder(f.handover.as_deref()),
    )
}

fn render_order_in_modern(ctx: &RenderContext<'_>, details: &EventDetails) -> String {
    let fallback = OrderInModern::default();
    let f = match details {
        EventDetails::OrderInModern(f) => f,
        _ => &fallback,
    };
    format!(
        "🕐 Заказ №{} в модерне\n\n{}\n\n👤 Клиент: {}\n🗓 Дата встречи: {}\n💳 Предоплата: {}\n📆 Дата закрытия: {}\n💬 Комментарий: {}",
        ctx.order_id,
        card_lines(&f.card),
        or_placeholder(f.client_name.as_deref()),
        datetime_or_placeholder(f.date_meeting.as_deref(), ctx.timezone),
        or_placeholder(f.prepayment.as_deref()),
        date_or_placeholder(f.expected_closing_date.as_deref(), ctx.timezone),
        or_placeholder(f.comment.as_deref()),
    )
}

fn render_close_order_reminder(ctx: &RenderContext<'_>, details: &EventDetails) -> String {
    let fallback = CloseOrderReminder::default();
    let f = match details {
        EventDetails::CloseOrderReminder(f) => f,
        _ => &fallback,
    };
    format!(
        "⚠️ Закройте заказ №{}\n\n{}\n\n👤 Клиент: {}\n🗓 Дата встречи: {}\n⏰ Просрочен на {} дн.",
        ctx.order_id,
        card_lines(&f.card),
        or_placeholder(f.client_name.as_deref()),
        datetime_or_placeholder(f.date_meeting.as_deref(), ctx.timezone),
        f.days_overdue.max(0),
    )
}

fn render_modern_closing_reminder(ctx: &RenderContext<'_>, details: &EventDetails) -> String {
    let fallback = ModernClosingReminder::default();
    let f = match details {
        EventDetails::ModernClosingReminder(f) => f,
        _ => &fallback,
    };
    let has_date = f
        .expected_closing_date
        .as_deref()
        .is_some_and(|d| !d.trim().is_empty() && d.trim() != NOT_SPECIFIED);
    let due = ClosingDue::classify(f.days_until_closing, has_date);
    format!(
        "📆 Напоминание о закрытии модерна\n\n📋 Заказ №{}\n\n{}\n\n👤 Клиент: {}\n🗓 Дата встречи: {}\n📅 Дата закрытия: {}\n{}",
        ctx.order_id,
        card_lines(&f.card),
        or_placeholder(f.client_name.as_deref()),
        datetime_or_placeholder(f.date_meeting.as_deref(), ctx.timezone),
        if has_date {
            date_or_placeholder(f.expected_closing_date.as_deref(), ctx.timezone)
        } else {
            NOT_SPECIFIED.to_string()
        },
        due.line(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(city: Option<&str>) -> RenderContext<'_> {
        RenderContext {
            order_id: 1001,
            city,
            timezone: chrono_tz::Europe::Moscow,
        }
    }

    fn empty_details(kind: EventKind) -> EventDetails {
        EventDetails::from_map(kind, &serde_json::Map::new())
    }

    #[test]
    fn test_registry_is_indexed_by_kind() {
        for kind in EventKind::ALL {
            assert_eq!(TemplateRegistry::template(kind).kind, kind);
            assert_eq!(TemplateRegistry::resolve(kind.as_str()).unwrap().kind, kind);
        }
    }

    #[test]
    fn test_resolve_unknown_template() {
        assert!(matches!(
            TemplateRegistry::resolve("birthday_greeting"),
            Err(DispatchError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn test_policies() {
        assert_eq!(
            TemplateRegistry::template(EventKind::NewOrder).policy,
            RecipientPolicy::Director
        );
        assert_eq!(
            TemplateRegistry::template(EventKind::DateChange).policy,
            RecipientPolicy::Both
        );
        assert_eq!(
            TemplateRegistry::template(EventKind::OrderRejection).policy,
            RecipientPolicy::Both
        );
        assert_eq!(
            TemplateRegistry::template(EventKind::OrderClosed).policy,
            RecipientPolicy::Master
        );
    }

    #[test]
    fn test_empty_payloads_render_placeholders() {
        for kind in EventKind::ALL {
            let template = TemplateRegistry::template(kind);
            let text = template.render(&ctx(Some("Москва")), &empty_details(kind));
            assert!(text.contains("1001"), "{} lost the order id", kind);
            assert!(!text.contains("undefined"), "{}: {}", kind, text);
            assert!(!text.contains("null"), "{}: {}", kind, text);
            if kind != EventKind::MasterReassigned {
                assert!(text.contains(NOT_SPECIFIED), "{} has no placeholder", kind);
            }
        }
    }

    #[test]
    fn test_mismatched_details_still_render() {
        let text = TemplateRegistry::template(EventKind::NewOrder)
            .render(&ctx(None), &EventDetails::MasterReassigned);
        assert!(text.starts_with("🆕 Поступил новый заказ №1001"));
    }

    #[test]
    fn test_new_order_formats_meeting_date() {
        let details = EventDetails::NewOrder(NewOrder {
            client_name: Some("Анна".into()),
            date_meeting: Some("2025-06-01T09:00:00Z".into()),
            ..Default::default()
        });
        let text =
            TemplateRegistry::template(EventKind::NewOrder).render(&ctx(Some("Москва")), &details);
        assert!(text.contains("👤 Клиент: Анна"));
        assert!(text.contains("🗓 Дата встречи: 01.06.2025, 12:00"));
        assert!(text.contains("🏙 Город: Москва"));
        assert!(text.contains("Направление: БТ"));
    }

    #[test]
    fn test_city_line_only_for_director_copies() {
        let details = empty_details(EventKind::DateChange);
        let template = TemplateRegistry::template(EventKind::DateChange);
        assert!(template.render(&ctx(Some("Сочи")), &details).contains("🏙 Город: Сочи"));
        assert!(!template.render(&ctx(None), &details).contains("🏙 Город"));
    }

    #[test]
    fn test_rejection_headline_depends_on_reason() {
        let template = TemplateRegistry::template(EventKind::OrderRejection);
        let non_order = EventDetails::OrderRejection(OrderRejection {
            reason: Some(" Незаказ ".into()),
            ..Default::default()
        });
        let cancelled = EventDetails::OrderRejection(OrderRejection {
            reason: Some("Клиент передумал".into()),
            ..Default::default()
        });

        assert!(template.render(&ctx(None), &non_order).starts_with("🚫 Заказ №1001: незаказ"));
        assert!(template.render(&ctx(None), &cancelled).starts_with("❌ Заказ №1001 Отменен"));
        assert_eq!(RejectionReason::classify(None), RejectionReason::Cancelled);
    }

    #[test]
    fn test_closing_due_table() {
        assert_eq!(ClosingDue::classify(-2, true), ClosingDue::Overdue(2));
        assert_eq!(ClosingDue::classify(-1, false), ClosingDue::Overdue(1));
        assert_eq!(ClosingDue::classify(0, true), ClosingDue::Today);
        assert_eq!(ClosingDue::classify(0, false), ClosingDue::Undated);
        assert_eq!(ClosingDue::classify(4, true), ClosingDue::Remaining(4));
    }

    #[test]
    fn test_modern_reminder_overdue_text() {
        let details = EventDetails::ModernClosingReminder(ModernClosingReminder {
            expected_closing_date: Some("2025-06-01".into()),
            days_until_closing: -2,
            ..Default::default()
        });
        let text = TemplateRegistry::template(EventKind::ModernClosingReminder)
            .render(&ctx(None), &details);
        assert!(text.contains("📅 Дата закрытия: 01.06.2025"));
        assert!(text.ends_with("⚠️ Просрочено на 2 дн."));
    }

    #[test]
    fn test_modern_reminder_without_date() {
        let text = TemplateRegistry::template(EventKind::ModernClosingReminder)
            .render(&ctx(None), &empty_details(EventKind::ModernClosingReminder));
        assert!(text.contains("📅 Дата закрытия: Не указано"));
        assert!(text.ends_with("⚠️ Нужно закрыть модерн!"));
    }

    #[test]
    fn test_user_text_is_escaped() {
        let details = EventDetails::OrderInModern(OrderInModern {
            comment: Some("<b>срочно</b>".into()),
            ..Default::default()
        });
        let text =
            TemplateRegistry::template(EventKind::OrderInModern).render(&ctx(None), &details);
        assert!(text.contains("&lt;b&gt;срочно&lt;/b&gt;"));
    }
}
