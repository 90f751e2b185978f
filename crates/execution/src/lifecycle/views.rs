use ftrade_domain::entities::{Order, OrderId, Position};
use ftrade_domain::value_objects::Symbol;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read-only copies of positions and working orders for queries.
///
/// Each symbol worker publishes its state here after every mutation; the
/// worker's own copy stays authoritative.
#[derive(Debug, Clone, Default)]
pub struct BookViews {
    positions: Arc<RwLock<BTreeMap<Symbol, Position>>>,
    orders: Arc<RwLock<BTreeMap<OrderId, Order>>>,
}

impl BookViews {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, symbol: &Symbol, position: Option<&Position>, orders: &[&Order]) {
        {
            let mut positions = self.positions.write().await;
            match position {
                Some(p) => {
                    positions.insert(symbol.clone(), p.clone());
                }
                None => {
                    positions.remove(symbol);
                }
            }
        }

        let mut book = self.orders.write().await;
        book.retain(|_, o| &o.symbol != symbol);
        for order in orders {
            book.insert(order.id, (*order).clone());
        }
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.positions.read().await.values().cloned().collect()
    }

    pub async fn position(&self, symbol: &Symbol) -> Option<Position> {
        self.positions.read().await.get(symbol).cloned()
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.orders.read().await.values().cloned().collect()
    }
}
