use serde::Deserialize;

use super::templates::escape_html;

/// Outcome codes carried on redirects, e.g. `/?status=student_added`.
#[derive(Default, Deserialize)]
pub struct FlashQuery {
    pub status: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Info,
    Warning,
    Error,
}

impl FlashKind {
    fn class(self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Info => "info",
            FlashKind::Warning => "warning",
            FlashKind::Error => "error",
        }
    }
}

pub fn flash_block(kind: FlashKind, message: &str) -> String {
    format!(
        r#"<div class="flash {class}">{message}</div>"#,
        class = kind.class(),
        message = escape_html(message),
    )
}

/// Compose a flash message HTML snippet for known status or error codes.
pub fn compose_flash_message(query: &FlashQuery) -> String {
    if let Some(status) = query.status.as_deref() {
        let known = match status {
            "student_added" => Some((FlashKind::Success, "Student added.")),
            "student_updated" => Some((FlashKind::Success, "Updated.")),
            "student_deleted" => Some((FlashKind::Info, "Deleted.")),
            "registered" => Some((FlashKind::Success, "User registered. Please log in.")),
            "logged_in" => Some((FlashKind::Success, "Logged in successfully.")),
            "logged_out" => Some((FlashKind::Info, "Logged out.")),
            _ => None,
        };

        if let Some((kind, message)) = known {
            return flash_block(kind, message);
        }
    }

    if let Some(error) = query.error.as_deref() {
        return match error {
            "login_required" => flash_block(FlashKind::Warning, "Please log in to access this page."),
            _ => flash_block(FlashKind::Error, "Something went wrong, please try again."),
        };
    }

    String::new()
}
