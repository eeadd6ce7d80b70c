//! MQTT implementation of the session connection
//!
//! The module separates pure functions from I/O:
//!
//! - [`connection`] - Connection state and broker options
//! - [`message_handler`] - Event routing and reply parsing
//! - [`client`] - Event loop and publish/receive I/O
//!
//! # Usage
//!
//! ```rust,no_run
//! use agent_tools::config::SessionSection;
//! use agent_tools::transport::mqtt::MqttSessionConnection;
//!
//! # tokio_test::block_on(async {
//! let config = SessionSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     session_id: None,
//!     username_env: None,
//!     password_env: None,
//!     receive_timeout_secs: 300,
//! };
//!
//! let connection = MqttSessionConnection::connect(&config, "room-1").await?;
//! connection.disconnect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttSessionConnection;
pub use connection::ConnectionState;
pub use message_handler::{EventRoute, MessageHandler};
