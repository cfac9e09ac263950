//! Shared fixtures: a scripted exchange, a collecting notifier, and store
//! helpers on temp directories.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result as AnyResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tracktrade_core::market::{Candle, OrderFill, SymbolMeta};
use tracktrade_core::traits::{Notifier, SpotExchange};
use tracktrade_engine::{LadderSettings, MonitorConfig, MonitorDeps, Signal, StoreActor, StoreHandle};

/// Exchange whose ticker follows a script; once the script is exhausted the
/// last price repeats. Orders fill at the most recent price.
pub struct ScriptedExchange {
    pub script: Mutex<VecDeque<Result<Decimal, String>>>,
    pub last_price: Mutex<Option<Decimal>>,
    pub meta: SymbolMeta,
    pub balance: Mutex<Decimal>,
    pub orders: Mutex<Vec<(String, Decimal)>>,
    pub fills: Mutex<HashMap<String, OrderFill>>,
    pub next_order: AtomicU64,
    pub candle: Mutex<Option<Candle>>,
    pub ticker_calls: AtomicU64,
}

impl ScriptedExchange {
    pub fn new(prices: Vec<Result<Decimal, String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(prices.into_iter().collect()),
            last_price: Mutex::new(None),
            meta: SymbolMeta {
                pair: "TEST-USDT".to_string(),
                base_min_size: dec!(0.001),
                base_increment: dec!(0.0001),
                quote_increment: dec!(0.01),
            },
            balance: Mutex::new(dec!(1000)),
            orders: Mutex::new(Vec::new()),
            fills: Mutex::new(HashMap::new()),
            next_order: AtomicU64::new(1),
            candle: Mutex::new(None),
            ticker_calls: AtomicU64::new(0),
        })
    }

    pub fn with_prices(prices: &[Decimal]) -> Arc<Self> {
        Self::new(prices.iter().copied().map(Ok).collect())
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn sides(&self) -> Vec<String> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _)| s.clone())
            .collect()
    }
}

#[async_trait]
impl SpotExchange for ScriptedExchange {
    async fn ticker_price(&self, _pair: &str) -> AnyResult<Decimal> {
        self.ticker_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(price)) => {
                *self.last_price.lock().unwrap() = Some(price);
                Ok(price)
            }
            Some(Err(e)) => Err(anyhow!(e)),
            None => self
                .last_price
                .lock()
                .unwrap()
                .ok_or_else(|| anyhow!("no price available")),
        }
    }

    async fn available_balance(&self, _currency: &str) -> AnyResult<Decimal> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn symbol_meta(&self, _pair: &str) -> AnyResult<SymbolMeta> {
        Ok(self.meta.clone())
    }

    async fn place_market_buy(&self, _pair: &str, funds: Decimal) -> AnyResult<String> {
        let price = self
            .last_price
            .lock()
            .unwrap()
            .ok_or_else(|| anyhow!("no market price"))?;
        let id = format!("B{}", self.next_order.fetch_add(1, Ordering::SeqCst));
        self.orders.lock().unwrap().push(("buy".to_string(), funds));
        self.fills.lock().unwrap().insert(
            id.clone(),
            OrderFill {
                size: funds / price,
                funds,
            },
        );
        Ok(id)
    }

    async fn place_market_sell(&self, _pair: &str, size: Decimal) -> AnyResult<String> {
        let price = self
            .last_price
            .lock()
            .unwrap()
            .ok_or_else(|| anyhow!("no market price"))?;
        let id = format!("S{}", self.next_order.fetch_add(1, Ordering::SeqCst));
        self.orders.lock().unwrap().push(("sell".to_string(), size));
        self.fills.lock().unwrap().insert(
            id.clone(),
            OrderFill {
                size,
                funds: size * price,
            },
        );
        Ok(id)
    }

    async fn order_fill(&self, order_id: &str) -> AnyResult<OrderFill> {
        self.fills
            .lock()
            .unwrap()
            .get(order_id)
            .copied()
            .ok_or_else(|| anyhow!("unknown order {order_id}"))
    }

    async fn latest_candle(&self, _pair: &str, _interval: &str) -> AnyResult<Option<Candle>> {
        Ok(*self.candle.lock().unwrap())
    }

    async fn server_time(&self) -> AnyResult<DateTime<Utc>> {
        Ok(Utc::now())
    }
}

#[derive(Default)]
pub struct CollectingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn contains(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains(needle))
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn send(&self, text: String) {
        self.messages.lock().unwrap().push(text);
    }
}

pub fn settings() -> LadderSettings {
    LadderSettings {
        base_amount: dec!(50),
        growth_pct: dec!(2),
        max_tracks: 10,
    }
}

pub fn fast_monitor_cfg() -> MonitorConfig {
    MonitorConfig {
        poll: Duration::from_millis(10),
        armed_poll: Duration::from_millis(5),
        price_timeout: Duration::from_millis(150),
        fill_settle: Duration::from_millis(1),
        retrace_pct: dec!(1),
        profit_threshold_pct: dec!(2),
        quote_currency: "USDT".to_string(),
    }
}

pub fn spawn_store(dir: &tempfile::TempDir, capacity: usize) -> StoreHandle {
    StoreActor::spawn(
        settings(),
        capacity,
        dir.path().join("state.json"),
        dir.path().join("history.json"),
    )
    .unwrap()
}

pub fn signal(symbol: &str) -> Signal {
    Signal {
        symbol: symbol.to_string(),
        entry: dec!(100),
        stop: dec!(90),
        targets: vec![dec!(102), dec!(105)],
    }
}

pub fn deps(
    store: &StoreHandle,
    exchange: &Arc<ScriptedExchange>,
    notifier: &Arc<CollectingNotifier>,
) -> MonitorDeps {
    MonitorDeps {
        store: store.clone(),
        exchange: exchange.clone() as Arc<dyn SpotExchange>,
        notifier: notifier.clone() as Arc<dyn Notifier>,
    }
}

/// Polls the store until the slot is empty, i.e. the position finalized.
pub async fn wait_for_settlement(store: &StoreHandle, slot_id: u64) {
    for _ in 0..400 {
        if store.slot(slot_id).await.unwrap().is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("position in slot {slot_id} never settled");
}
