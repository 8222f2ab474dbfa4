//! # Relay Test Utilities
//!
//! Shared test utilities for the signal relay.
//!
//! ## Modules
//!
//! - `fixtures` - `TestPeer` builder and `PeerInbox` assertions
//! - `server_harness` - `TestRelayServer`, the real routers on a random port
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let (host, mut host_inbox) = TestPeer::new("host").with_role("host").build();
//!     let (guest, _guest_inbox) = TestPeer::new("guest").with_role("guest").build();
//!
//!     let mut room = Room::new("lobby", RoomOptions::default());
//!     room.connect_roles("host", "guest");
//!     room.register(host);
//!     room.register(guest.clone());
//!
//!     host_inbox.expect_add_peer(guest.id()).await;
//! }
//! ```

pub mod fixtures;
pub mod server_harness;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
