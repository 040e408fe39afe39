//! Notification rendering.
//!
//! A push payload maps onto one [`NotificationKind`]; each kind fixes the
//! icon, grouping tag and default target, and interpolates payload fields
//! into the body. Unknown kinds fall back to the payload's own title and
//! body, then to the configured defaults.

mod payload;
mod tray;

pub use payload::PushPayload;
pub use tray::{NotificationTray, Notifier, NotifyError};

use crate::config::NotificationConfig;

/// Tag shared by notifications without a more specific group.
pub const GENERIC_TAG: &str = "general";

/// Data carried with a notification back to the click handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationData {
    /// Page to show when the notification is clicked.
    pub url: String,
}

/// Display options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Grouping key; a new notification replaces one with the same tag.
    pub tag: String,
    /// Re-alert the user when replacing a notification with the same tag.
    pub renotify: bool,
    pub data: NotificationData,
}

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub options: NotificationOptions,
}

impl Notification {
    pub fn tag(&self) -> &str {
        &self.options.tag
    }

    pub fn target(&self) -> &str {
        &self.options.data.url
    }
}

/// Known notification classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    ReminderDue,
    BudgetAlert,
    ChecklistOpen,
    NoteUpdate,
    Generic,
}

impl NotificationKind {
    /// Map the payload `type` discriminant.
    pub fn from_type(kind: Option<&str>) -> Self {
        match kind {
            Some("REMINDER_DUE") => Self::ReminderDue,
            Some("BUDGET_ALERT") => Self::BudgetAlert,
            Some("CHECKLIST_OPEN") => Self::ChecklistOpen,
            Some("NOTE_UPDATE") => Self::NoteUpdate,
            _ => Self::Generic,
        }
    }
}

struct Template {
    title: &'static str,
    fallback_body: &'static str,
    icon: &'static str,
    tag: &'static str,
    url: &'static str,
}

fn template(kind: NotificationKind) -> Option<Template> {
    let template = match kind {
        NotificationKind::ReminderDue => Template {
            title: "Reminder due",
            fallback_body: "You have a reminder due.",
            icon: "/assets/icons/reminder.png",
            tag: "reminder",
            url: "/reminders",
        },
        NotificationKind::BudgetAlert => Template {
            title: "Budget alert",
            fallback_body: "A budget needs your attention.",
            icon: "/assets/icons/budget.png",
            tag: "budget",
            url: "/budget",
        },
        NotificationKind::ChecklistOpen => Template {
            title: "Checklist open",
            fallback_body: "You have an open checklist.",
            icon: "/assets/icons/checklist.png",
            tag: "checklist",
            url: "/checklists",
        },
        NotificationKind::NoteUpdate => Template {
            title: "Note updated",
            fallback_body: "One of your notes changed.",
            icon: "/assets/icons/note.png",
            tag: "notes",
            url: "/notes",
        },
        NotificationKind::Generic => return None,
    };
    Some(template)
}

/// Body text interpolated from payload fields, if the fields are there.
fn interpolate(kind: NotificationKind, payload: &PushPayload) -> Option<String> {
    match kind {
        NotificationKind::ReminderDue => payload.text("details"),
        NotificationKind::BudgetAlert => {
            let spent = payload.text("spent")?;
            let limit = payload.text("limit")?;
            let category = payload.text("category")?;
            Some(format!("Spent {spent} of {limit} on {category}"))
        }
        NotificationKind::ChecklistOpen => {
            let remaining = payload.text("remaining")?;
            let name = payload.text("name")?;
            Some(format!("{remaining} items left on {name}"))
        }
        NotificationKind::NoteUpdate => {
            let note = payload.text("note")?;
            Some(match payload.text("author") {
                Some(author) => format!("{author} updated {note}"),
                None => format!("{note} was updated"),
            })
        }
        NotificationKind::Generic => payload.text("body"),
    }
}

/// The notification shown when there is nothing usable in the payload.
pub fn generic(config: &NotificationConfig) -> Notification {
    Notification {
        title: config.default_title.clone(),
        options: NotificationOptions {
            body: config.default_body.clone(),
            icon: config.default_icon.clone(),
            badge: config.badge.clone(),
            tag: GENERIC_TAG.to_string(),
            renotify: config.renotify,
            data: NotificationData {
                url: "/".to_string(),
            },
        },
    }
}

/// Render a decoded payload.
pub fn render(payload: &PushPayload, config: &NotificationConfig) -> Notification {
    let kind = NotificationKind::from_type(payload.kind());
    let body = interpolate(kind, payload);
    let title = payload.text("title");
    let url = payload.text("url");

    let mut notification = generic(config);
    match template(kind) {
        Some(t) => {
            notification.title = title.unwrap_or_else(|| t.title.to_string());
            notification.options.body = body.unwrap_or_else(|| t.fallback_body.to_string());
            notification.options.icon = t.icon.to_string();
            notification.options.tag = t.tag.to_string();
            notification.options.data.url = url.unwrap_or_else(|| t.url.to_string());
        }
        None => {
            if let Some(title) = title {
                notification.title = title;
            }
            if let Some(body) = body {
                notification.options.body = body;
            }
            if let Some(url) = url {
                notification.options.data.url = url;
            }
        }
    }
    notification
}
