//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data in the
//! corresponding `*_statuses` table.

use std::fmt;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// Seed name in the lookup table.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Project lifecycle status.
    ProjectStatus {
        Queued = 1 => "queued",
        Planning = 2 => "planning",
        Generating = 3 => "generating",
        Rendering = 4 => "rendering",
        Completed = 5 => "completed",
        Failed = 6 => "failed",
    }
}

define_status_enum! {
    /// Clip processing status. Ids ascend in pipeline order.
    ClipStatus {
        Pending = 1 => "pending",
        Voiced = 2 => "voiced",
        Imaged = 3 => "imaged",
        Rendered = 4 => "rendered",
        Failed = 5 => "failed",
    }
}

define_status_enum! {
    /// Dispatch attempt status.
    JobStatus {
        Queued = 1 => "queued",
        Running = 2 => "running",
        Succeeded = 3 => "succeeded",
        Failed = 4 => "failed",
    }
}

impl ProjectStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Failed)
    }
}

impl ClipStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ClipStatus::Rendered | ClipStatus::Failed)
    }

    /// Forward-only transition: terminal statuses stay put, otherwise the
    /// later of `self` and `target` wins.
    pub fn advance(self, target: ClipStatus) -> ClipStatus {
        if self.is_terminal() {
            return self;
        }
        if target == ClipStatus::Failed || target.id() > self.id() {
            target
        } else {
            self
        }
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}
