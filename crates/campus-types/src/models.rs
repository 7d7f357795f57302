use serde::{Deserialize, Serialize};

/// Reserved identity of the configured super-admin. It is never stored, so it
/// sits outside the id space of the `users` table (which starts at 1).
pub const SENTINEL_USER_ID: i64 = 0;

/// Maximum number of images kept on a single post.
pub const MAX_POST_IMAGES: usize = 10;

/// Per-asset upload limit (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(Self::User),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// The fixed set of post categories. Wire values are the labels shown in the
/// school's client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Оголошення")]
    Announcement,
    #[serde(rename = "Питання")]
    Question,
    #[serde(rename = "Мем")]
    Meme,
    #[serde(rename = "Новина")]
    News,
    #[serde(rename = "Допомога")]
    Help,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::Announcement,
        Self::Question,
        Self::Meme,
        Self::News,
        Self::Help,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Announcement => "Оголошення",
            Self::Question => "Питання",
            Self::Meme => "Мем",
            Self::News => "Новина",
            Self::Help => "Допомога",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}
