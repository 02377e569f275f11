//! Repository ports and the background persistence writer
//!
//! The engine never awaits storage on its hot path: changes are queued on an
//! unbounded channel and written by a spawned task in submission order.
//! Write failures are logged and never fed back into the trading state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use types::account::Account;
use types::errors::TradingError;
use types::ids::{AccountId, OrderId};
use types::order::Order;
use types::route::MatchingEngineRoute;

#[async_trait]
pub trait AccountsRepository: Send + Sync {
    async fn load_accounts(&self) -> Result<Vec<Account>, TradingError>;

    async fn save_account(&self, account: &Account) -> Result<(), TradingError>;
}

#[async_trait]
pub trait OrdersRepository: Send + Sync {
    /// Active and pending orders
    async fn load_open_orders(&self) -> Result<Vec<Order>, TradingError>;

    /// Insert or update; terminal orders are kept as history
    async fn save_order(&self, order: &Order) -> Result<(), TradingError>;
}

#[async_trait]
pub trait RoutesRepository: Send + Sync {
    async fn load_routes(&self) -> Result<Vec<MatchingEngineRoute>, TradingError>;

    async fn save_route(&self, route: &MatchingEngineRoute) -> Result<(), TradingError>;

    async fn delete_route(&self, route_id: &str) -> Result<(), TradingError>;
}

/// The repositories the engine reads at start-up and writes through
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn AccountsRepository>,
    pub orders: Arc<dyn OrdersRepository>,
    pub routes: Arc<dyn RoutesRepository>,
}

impl Repositories {
    /// All three ports backed by one in-memory store
    pub fn in_memory(store: Arc<InMemoryRepository>) -> Self {
        Self {
            accounts: store.clone(),
            orders: store.clone(),
            routes: store,
        }
    }
}

/// In-memory implementation of every repository port.
///
/// Suitable for tests and single-process deployments without durability.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    accounts: RwLock<HashMap<AccountId, Account>>,
    orders: RwLock<HashMap<OrderId, Order>>,
    routes: RwLock<HashMap<String, MatchingEngineRoute>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, account_id: &AccountId) -> Option<Account> {
        self.accounts.read().get(account_id).cloned()
    }

    pub fn order(&self, order_id: &OrderId) -> Option<Order> {
        self.orders.read().get(order_id).cloned()
    }

    pub fn route(&self, route_id: &str) -> Option<MatchingEngineRoute> {
        self.routes.read().get(route_id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.orders.read().len()
    }
}

#[async_trait]
impl AccountsRepository for InMemoryRepository {
    async fn load_accounts(&self) -> Result<Vec<Account>, TradingError> {
        let mut accounts: Vec<Account> = self.accounts.read().values().cloned().collect();
        accounts.sort_by_key(|account| account.id);
        Ok(accounts)
    }

    async fn save_account(&self, account: &Account) -> Result<(), TradingError> {
        self.accounts.write().insert(account.id, account.clone());
        Ok(())
    }
}

#[async_trait]
impl OrdersRepository for InMemoryRepository {
    async fn load_open_orders(&self) -> Result<Vec<Order>, TradingError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|order| !order.status.is_terminal())
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn save_order(&self, order: &Order) -> Result<(), TradingError> {
        let mut orders = self.orders.write();
        // an out-of-order write never replaces a newer version
        if let Some(existing) = orders.get(&order.id) {
            if existing.version > order.version {
                return Ok(());
            }
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }
}

#[async_trait]
impl RoutesRepository for InMemoryRepository {
    async fn load_routes(&self) -> Result<Vec<MatchingEngineRoute>, TradingError> {
        let mut routes: Vec<MatchingEngineRoute> = self.routes.read().values().cloned().collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(routes)
    }

    async fn save_route(&self, route: &MatchingEngineRoute) -> Result<(), TradingError> {
        self.routes.write().insert(route.id.clone(), route.clone());
        Ok(())
    }

    async fn delete_route(&self, route_id: &str) -> Result<(), TradingError> {
        self.routes.write().remove(route_id);
        Ok(())
    }
}

#[derive(Debug)]
enum PersistenceCommand {
    SaveOrder(Box<Order>),
    SaveAccount(Box<Account>),
    SaveRoute(Box<MatchingEngineRoute>),
    DeleteRoute(String),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget handle onto the background writer task
#[derive(Debug, Clone)]
pub struct PersistenceWriter {
    tx: mpsc::UnboundedSender<PersistenceCommand>,
}

impl PersistenceWriter {
    /// Start the writer task on the current Tokio runtime.
    ///
    /// The task ends once every `PersistenceWriter` clone is dropped and
    /// the queue has drained.
    pub fn spawn(repositories: Repositories) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_writer(repositories, rx));
        (Self { tx }, handle)
    }

    pub fn save_order(&self, order: &Order) {
        self.send(PersistenceCommand::SaveOrder(Box::new(order.clone())));
    }

    pub fn save_account(&self, account: &Account) {
        self.send(PersistenceCommand::SaveAccount(Box::new(account.clone())));
    }

    pub fn save_route(&self, route: &MatchingEngineRoute) {
        self.send(PersistenceCommand::SaveRoute(Box::new(route.clone())));
    }

    pub fn delete_route(&self, route_id: &str) {
        self.send(PersistenceCommand::DeleteRoute(route_id.to_string()));
    }

    /// Wait until everything queued before this call has been written.
    ///
    /// Fails when the writer task is no longer running.
    pub async fn flush(&self) -> Result<(), TradingError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(PersistenceCommand::Flush(done_tx));
        done_rx.await.map_err(|_| {
            warn!("Persistence writer stopped before flush completed");
            TradingError::Repository {
                message: "persistence writer is not running".to_string(),
            }
        })
    }

    fn send(&self, command: PersistenceCommand) {
        if let Err(err) = self.tx.send(command) {
            error!(command = ?err.0, "Persistence writer is not running; change dropped");
        }
    }
}

async fn run_writer(repositories: Repositories, mut rx: mpsc::UnboundedReceiver<PersistenceCommand>) {
    while let Some(command) = rx.recv().await {
        let result = match command {
            PersistenceCommand::SaveOrder(order) => repositories.orders.save_order(&order).await,
            PersistenceCommand::SaveAccount(account) => repositories.accounts.save_account(&account).await,
            PersistenceCommand::SaveRoute(route) => repositories.routes.save_route(&route).await,
            PersistenceCommand::DeleteRoute(route_id) => repositories.routes.delete_route(&route_id).await,
            PersistenceCommand::Flush(done) => {
                let _ = done.send(());
                Ok(())
            }
        };
        if let Err(err) = result {
            error!(error = %err, "Persistence write failed");
        }
    }
    debug!("Persistence writer stopped");
}
