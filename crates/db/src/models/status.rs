//! Status helper enums mapping to SMALLINT columns.
//!
//! Each enum variant's discriminant is the value stored in the database.

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up the variant for a database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( x if x == $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Order ledger status. Values are part of the wire format.
    OrderStatus {
        Failed = cascade_core::order_lifecycle::STATUS_FAILED,
        Running = cascade_core::order_lifecycle::STATUS_RUNNING,
        Complete = cascade_core::order_lifecycle::STATUS_COMPLETE,
    }
}

define_status_enum! {
    /// Outcome of one submission to the execution backend.
    AttemptOutcome {
        /// Reserved; the backend call has not been recorded yet.
        Pending = 0,
        Submitted = 1,
        Rejected = 2,
    }
}
