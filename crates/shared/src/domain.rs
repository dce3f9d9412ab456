use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TEMPORARY_ID_PREFIX: &str = "tmp-";

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(CommentId);
id_newtype!(UserId);

impl CommentId {
    /// Client-side placeholder used until the server assigns the canonical id.
    pub fn temporary() -> Self {
        Self(format!("{TEMPORARY_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Popularity,
    Oldest,
    Newest,
    Attachments,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Popularity => "popularity",
            Self::Oldest => "oldest",
            Self::Newest => "newest",
            Self::Attachments => "attachments",
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "popularity" => Ok(Self::Popularity),
            "oldest" => Ok(Self::Oldest),
            "newest" => Ok(Self::Newest),
            "attachments" => Ok(Self::Attachments),
            other => Err(format!("unknown sort key '{other}'")),
        }
    }
}
