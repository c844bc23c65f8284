//! Latest-known market state and order bookkeeping


use crate::adt::ConcurrentMap;
use crate::types::{AccountInformation, Depth, Order, Ticker};
use std::sync::Arc;

/// Last ticker/depth per symbol, account snapshot and orders
pub struct Cache {
    last_tickers: ConcurrentMap<String, Ticker>,
    last_depths: ConcurrentMap<String, Depth>,
    // Single slot, replaced as a whole and never mutated in place
    account: ConcurrentMap<(), Arc<AccountInformation>>,
    // Lock order is orders then orders_by_symbol
    orders: ConcurrentMap<u64, Order>,
    orders_by_symbol: ConcurrentMap<String, Vec<u64>>,
}

impl Cache {
    pub fn new() -> Self {
        Self {
            last_tickers: ConcurrentMap::new(),
            last_depths: ConcurrentMap::new(),
            account: ConcurrentMap::new(),
            orders: ConcurrentMap::new(),
            orders_by_symbol: ConcurrentMap::new(),
        }
    }

    pub fn update_last_ticker(&self, ticker: Ticker) {
        self.last_tickers.put(ticker.symbol.clone(), ticker);
    }

    pub fn update_last_depth(&self, depth: Depth) {
        self.last_depths.put(depth.symbol.clone(), depth);
    }

    pub fn last_ticker(&self, symbol: &str) -> Option<Ticker> {
        self.last_tickers.get(&symbol.to_string())
    }

    pub fn last_depth(&self, symbol: &str) -> Option<Depth> {
        self.last_depths.get(&symbol.to_string())
    }

    pub fn update_account_information(&self, account: AccountInformation) {
        self.account.put((), Arc::new(account));
    }

    /// Current account snapshot, if one has been received
    pub fn account_information(&self) -> Option<Arc<AccountInformation>> {
        self.account.get(&())
    }

    /// Insert an unseen order or update the status of a known one.
    ///
    /// `order_id` and `symbol` of a stored order never change; a replayed
    /// update leaves the cache unchanged. Returns `true` for a new order.
    ///
    /// A new order is indexed under its symbol while its key is still
    /// locked, so an order visible through `order` is always listed by
    /// `order_ids_for`.
    pub fn update_order(&self, order: Order) -> bool {
        let order_id = order.order_id;
        let status = order.status;

        self.orders.upsert(
            order_id,
            || {
                self.orders_by_symbol.alter(order.symbol.clone(), Vec::new, |ids| {
                    if !ids.contains(&order_id) {
                        ids.push(order_id);
                    }
                });
                order
            },
            |existing| existing.status = status,
        )
    }

    pub fn order(&self, order_id: u64) -> Option<Order> {
        self.orders.get(&order_id)
    }

    /// Ids of orders seen for `symbol`, in insertion order. May briefly list
    /// an id whose order is still being committed.
    pub fn order_ids_for(&self, symbol: &str) -> Vec<u64> {
        self.orders_by_symbol
            .get(&symbol.to_string())
            .unwrap_or_default()
    }

    pub fn orders_for(&self, symbol: &str) -> Vec<Order> {
        self.order_ids_for(symbol)
            .into_iter()
            .filter_map(|id| self.orders.get(&id))
            .collect()
    }

    /// Orders not yet in a final state
    pub fn open_orders(&self) -> Vec<Order> {
        let mut open: Vec<Order> = self
            .orders
            .values()
            .into_iter()
            .filter(|o| !o.status.is_final())
            .collect();
        open.sort_by_key(|o| o.order_id);
        open
    }

    pub fn symbols(&self) -> Vec<String> {
        self.last_tickers.keys()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}
