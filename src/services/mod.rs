pub mod low_stock;
pub mod products;
pub mod restock_requests;
pub mod shops;
pub mod stock_ledger;

use std::sync::Arc;

use crate::{db::DbPool, events::EventSender};

/// Service wiring shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub restock_requests: Arc<restock_requests::RestockRequestService>,
    pub products: Arc<products::ProductService>,
    pub shops: Arc<shops::ShopService>,
    pub stock_ledger: Arc<stock_ledger::StockLedger>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        let low_stock = low_stock::LowStockMonitor::new(db.clone(), event_sender.clone());
        let ledger =
            stock_ledger::StockLedger::new(db.clone(), event_sender.clone(), low_stock.clone());
        let restock_requests = Arc::new(restock_requests::RestockRequestService::new(
            db.clone(),
            event_sender.clone(),
            low_stock,
        ));
        let products = Arc::new(products::ProductService::new(db.clone(), ledger.clone()));
        let shops = Arc::new(shops::ShopService::new(db.clone()));

        Self {
            restock_requests,
            products,
            shops,
            stock_ledger: Arc::new(ledger),
        }
    }
}
