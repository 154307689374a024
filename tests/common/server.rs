//! Test server management.
//!
//! Spawns an in-process tawkd gateway over an in-memory database. Running
//! in-process keeps the database handle available for seeding user profiles,
//! which in production belong to the auth collaborator.

use super::client::TestClient;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tawkd::config::LimitsConfig;
use tawkd::db::{Database, Presence, User};
use tawkd::dispatch::MessageDispatcher;
use tawkd::network::Gateway;
use tawkd::router::EventRouter;
use tawkd::state::ConnectionRegistry;
use tawkd::storage::NoOpStore;
use tokio::time::sleep;

/// A test server instance.
pub struct TestServer {
    pub db: Database,
    addr: SocketAddr,
}

impl TestServer {
    /// Spawn a new test server on an ephemeral port.
    pub async fn spawn() -> anyhow::Result<Self> {
        let db = Database::new(":memory:").await?;

        let registry = Arc::new(ConnectionRegistry::new());
        let router = EventRouter::new(Arc::clone(&registry));
        let dispatcher = MessageDispatcher::new(db.clone(), router.clone(), Arc::new(NoOpStore));

        let gateway = Gateway::bind(
            "127.0.0.1:0".parse().expect("loopback addr"),
            None,
            registry,
            router,
            dispatcher,
            db.clone(),
            LimitsConfig::default(),
        )
        .await?;
        let addr = gateway.local_addr()?;

        tokio::spawn(async move {
            let _ = gateway.run().await;
        });

        Ok(Self { db, addr })
    }

    /// WebSocket URL for this server, optionally carrying a user id.
    pub fn ws_url(&self, user_id: Option<&str>) -> String {
        match user_id {
            Some(user_id) => format!("ws://{}/?user_id={}", self.addr, user_id),
            None => format!("ws://{}/", self.addr),
        }
    }

    /// Seed a user profile directly in the store.
    pub async fn seed_user(&self, first_name: &str, last_name: &str, email: &str) -> User {
        self.db
            .users()
            .create(first_name, last_name, email)
            .await
            .expect("seed user")
    }

    /// Connect a client for `user_id` and wait for presence registration.
    pub async fn connect(&self, user_id: &str) -> anyhow::Result<TestClient> {
        let client = TestClient::connect(&self.ws_url(Some(user_id))).await?;
        self.wait_presence(user_id, Presence::Online).await?;
        Ok(client)
    }

    /// Poll until the persisted presence for `user_id` matches `expected`.
    ///
    /// Presence is written right after (un)registration, so observing it
    /// also orders the registry update before the test continues.
    pub async fn wait_presence(&self, user_id: &str, expected: Presence) -> anyhow::Result<()> {
        for _ in 0..100 {
            if let Some(user) = self.db.users().find_by_id(user_id).await?
                && user.presence == expected
            {
                return Ok(());
            }
            sleep(Duration::from_millis(20)).await;
        }
        anyhow::bail!(
            "user {user_id} did not reach presence {:?} within 2 seconds",
            expected.as_str()
        )
    }
}
