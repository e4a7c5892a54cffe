use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Opaque backend-assigned task identifier.
    TaskId
);

string_id!(
    /// Identifier of the domain entity (collection item) a task acts upon.
    EntityId
);

string_id!(
    /// Task discriminator such as `sync` or `download`.
    ///
    /// Kept open-ended because the backend may introduce new job kinds; the
    /// well-known ones have constructors below.
    TaskType
);

impl TaskType {
    pub const SYNC: &'static str = "sync";
    pub const SYNC_RECENT_UPDATES: &'static str = "sync_recent_updates";
    pub const DOWNLOAD: &'static str = "download";

    pub fn sync() -> Self {
        Self::new(Self::SYNC)
    }

    pub fn sync_recent_updates() -> Self {
        Self::new(Self::SYNC_RECENT_UPDATES)
    }

    pub fn download() -> Self {
        Self::new(Self::DOWNLOAD)
    }

    /// Records created from an event that did not name a type carry the
    /// empty type until a later update fills it in.
    pub fn is_unknown(&self) -> bool {
        self.is_empty()
    }
}
