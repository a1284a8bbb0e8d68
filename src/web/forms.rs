//! Declarative form validation.
//!
//! Each form field carries a static list of [`Rule`]s. Values are trimmed
//! before the rules run (passwords excepted), a failed [`Rule::Required`]
//! stops the remaining rules for that field, and every other failure is
//! collected so the page can show all messages at once.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use serde::Deserialize;

use super::models::{Credentials, NewStudent, StudentRow};

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z\s\-]+$").unwrap());
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9+\-\s]{7,20}$").unwrap());
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)+$").unwrap()
});

const NAME_MESSAGE: &str = "Names must contain only letters, spaces or hyphens";

pub enum Rule {
    Required,
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    Pattern {
        regex: &'static LazyLock<Regex>,
        message: &'static str,
    },
    Email,
}

static NAME_RULES: [Rule; 3] = [
    Rule::Required,
    Rule::Length {
        min: Some(1),
        max: Some(50),
    },
    Rule::Pattern {
        regex: &NAME_PATTERN,
        message: NAME_MESSAGE,
    },
];

static EMAIL_RULES: [Rule; 3] = [
    Rule::Required,
    Rule::Email,
    Rule::Length {
        min: None,
        max: Some(120),
    },
];

static PHONE_RULES: [Rule; 2] = [
    Rule::Required,
    Rule::Pattern {
        regex: &PHONE_PATTERN,
        message: "Invalid phone",
    },
];

static USERNAME_RULES: [Rule; 2] = [
    Rule::Required,
    Rule::Length {
        min: Some(3),
        max: Some(80),
    },
];

static PASSWORD_RULES: [Rule; 2] = [
    Rule::Required,
    Rule::Length {
        min: Some(8),
        max: None,
    },
];

impl Rule {
    /// `Err(message)` on failure; the flag says whether later rules still run.
    fn check(&self, value: &str) -> Result<(), (String, bool)> {
        match self {
            Rule::Required => {
                if value.trim().is_empty() {
                    Err(("This field is required.".to_string(), false))
                } else {
                    Ok(())
                }
            }
            Rule::Length { min, max } => {
                let len = value.chars().count();
                let too_short = min.is_some_and(|min| len < min);
                let too_long = max.is_some_and(|max| len > max);
                if !too_short && !too_long {
                    return Ok(());
                }
                let message = match (min, max) {
                    (Some(min), Some(max)) => {
                        format!("Field must be between {min} and {max} characters long.")
                    }
                    (Some(min), None) => format!("Field must be at least {min} characters long."),
                    (None, Some(max)) => format!("Field cannot be longer than {max} characters."),
                    (None, None) => return Ok(()),
                };
                Err((message, true))
            }
            Rule::Pattern { regex, message } => {
                if regex.is_match(value) {
                    Ok(())
                } else {
                    Err((message.to_string(), true))
                }
            }
            Rule::Email => {
                if EMAIL_PATTERN.is_match(value) {
                    Ok(())
                } else {
                    Err(("Invalid email address.".to_string(), true))
                }
            }
        }
    }
}

/// Field name to messages, in field-name order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    fn check(&mut self, field: &'static str, value: &str, rules: &[Rule]) {
        for rule in rules {
            if let Err((message, keep_going)) = rule.check(value) {
                self.add(field, message);
                if !keep_going {
                    break;
                }
            }
        }
    }

    fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StudentForm {
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub csrf_token: String,
}

impl StudentForm {
    pub fn from_row(row: &StudentRow) -> Self {
        Self {
            firstname: row.firstname.clone(),
            lastname: row.lastname.clone(),
            email: row.email.clone(),
            phone: row.phone.clone(),
            csrf_token: String::new(),
        }
    }

    pub fn validate(&self) -> Result<NewStudent, FormErrors> {
        let student = NewStudent {
            firstname: self.firstname.trim().to_string(),
            lastname: self.lastname.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
        };

        let mut errors = FormErrors::default();
        errors.check("firstname", &student.firstname, &NAME_RULES);
        errors.check("lastname", &student.lastname, &NAME_RULES);
        errors.check("email", &student.email, &EMAIL_RULES);
        errors.check("phone", &student.phone, &PHONE_RULES);
        errors.into_result(student)
    }
}

/// Shared by the registration and login pages; both apply the same rules.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub csrf_token: String,
}

impl CredentialsForm {
    pub fn validate(&self) -> Result<Credentials, FormErrors> {
        let credentials = Credentials {
            username: self.username.trim().to_string(),
            password: self.password.clone(),
        };

        let mut errors = FormErrors::default();
        errors.check("username", &credentials.username, &USERNAME_RULES);
        errors.check("password", &credentials.password, &PASSWORD_RULES);
        errors.into_result(credentials)
    }
}
