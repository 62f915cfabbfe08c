//! Lifecycle and classification enums.
//!
//! Each enum is persisted and exchanged by its upper-snake name (`ON_CALL`, `AMBULANCE_PENDING`),
//! matching the names used by the wire schema.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant, )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(CoreError::InvalidInput(format!(
                        concat!("unknown ", stringify!($name), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

named_enum! {
    /// Lifecycle of an incoming emergency call.
    pub enum EmergencyCallStatus {
        Pending => "AMBULANCE_PENDING",
        Dispatched => "AMBULANCE_DISPATCHED",
        Completed => "AMBULANCE_COMPLETED",
    }
}

named_enum! {
    /// Operational state of an ambulance. Only the dispatch engine moves an ambulance between
    /// `Available` and `OnCall`.
    pub enum AmbulanceStatus {
        Available => "AVAILABLE",
        OnCall => "ON_CALL",
        Maintenance => "MAINTENANCE",
    }
}

named_enum! {
    pub enum InjurySeverity {
        Low => "LOW",
        Moderate => "MODERATE",
        High => "HIGH",
        Critical => "CRITICAL",
    }
}

named_enum! {
    pub enum StaffRole {
        Paramedic => "PARAMEDIC",
        Driver => "DRIVER",
        Operator => "OPERATOR",
        HospitalStaff => "HOSPITAL_STAFF",
        Other => "OTHER",
    }
}

named_enum! {
    /// Lifecycle of an ambulance request: `Pending -> Accepted -> Completed`, or `Rejected`.
    pub enum RequestStatus {
        Pending => "PENDING",
        Accepted => "ACCEPTED",
        Rejected => "REJECTED",
        Completed => "COMPLETED",
    }
}

impl Default for EmergencyCallStatus {
    fn default() -> Self {
        EmergencyCallStatus::Pending
    }
}

impl Default for InjurySeverity {
    fn default() -> Self {
        InjurySeverity::Low
    }
}
