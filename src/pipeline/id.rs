//! Identity types for the pipeline system.
//!
//! All IDs are newtypes over `u64` handed out by process-wide counters, so an
//! id is never reused while the process lives. Ids are what sockets store to
//! name their owner and their attached connections without holding a strong
//! reference back to them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal, $counter:ident) => {
        static $counter: AtomicU64 = AtomicU64::new(0);

        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// Allocate a fresh id.
            pub fn next() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            #[inline]
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifies a [`Step`](crate::pipeline::step::Step).
    StepId,
    "step",
    NEXT_STEP_ID
);

entity_id!(
    /// Identifies a [`SourceEntry`](crate::pipeline::source::SourceEntry).
    SourceId,
    "source",
    NEXT_SOURCE_ID
);

entity_id!(
    /// Generated unique id of a socket.
    SocketId,
    "socket",
    NEXT_SOCKET_ID
);

entity_id!(
    /// Identifies a [`Connection`](crate::pipeline::connection::Connection).
    ConnectionId,
    "connection",
    NEXT_CONNECTION_ID
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = StepId::next();
        let b = StepId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn display_uses_prefix() {
        assert_eq!(format!("{}", SocketId(7)), "socket-7");
        assert_eq!(format!("{}", ConnectionId(3)), "connection-3");
        assert_eq!(format!("{:?}", SourceId(1)), "SourceId(1)");
    }
}
