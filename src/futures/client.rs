use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use crate::core::config::SodexConfig;
use crate::core::errors::SodexError;
use crate::core::kernel::{
    ListenKey, ListenKeyProvider, RestClient, RestClientBuilder, RestClientConfig, SodexSigner,
    DEFAULT_LISTEN_KEY_TTL,
};
use crate::core::types::{
    to_wire_symbol, KlineInterval, OrderSide, OrderType, PositionSide, TimeInForce,
};
use crate::futures::types::{
    FuturesBalance, FuturesFill, FuturesKline, FuturesOrder, FuturesOrderbook, FuturesSymbol,
    FuturesTicker, FuturesTrade, Page,
};

const BASE: &str = "/fut/v1";
const OPEN_ORDER_STATES: [&str; 2] = ["1", "2"];
const PAGE_SIZE: i64 = 100;
const MAX_BATCH_CANCEL: usize = 20;

/// Parameters for a futures order.
#[derive(Debug, Clone)]
pub struct FuturesOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub position_side: PositionSide,
    pub quantity: f64,
    pub price: Option<f64>,
    pub client_order_id: Option<String>,
    pub leverage: Option<u32>,
    pub time_in_force: Option<TimeInForce>,
    pub reduce_only: Option<bool>,
    pub trigger_profit_price: Option<f64>,
    pub trigger_stop_price: Option<f64>,
}

impl FuturesOrderRequest {
    #[must_use]
    pub fn market(symbol: &str, side: OrderSide, position_side: PositionSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_owned(),
            side,
            order_type: OrderType::Market,
            position_side,
            quantity,
            price: None,
            client_order_id: None,
            leverage: None,
            time_in_force: None,
            reduce_only: None,
            trigger_profit_price: None,
            trigger_stop_price: None,
        }
    }

    #[must_use]
    pub fn limit(
        symbol: &str,
        side: OrderSide,
        position_side: PositionSide,
        quantity: f64,
        price: f64,
    ) -> Self {
        let mut request = Self::market(symbol, side, position_side, quantity);
        request.order_type = OrderType::Limit;
        request.price = Some(price);
        request
    }

    #[must_use]
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = Some(leverage);
        self
    }

    #[must_use]
    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = Some(tif);
        self
    }

    #[must_use]
    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = Some(true);
        self
    }

    #[must_use]
    pub fn with_take_profit(mut self, price: f64) -> Self {
        self.trigger_profit_price = Some(price);
        self
    }

    #[must_use]
    pub fn with_stop_loss(mut self, price: f64) -> Self {
        self.trigger_stop_price = Some(price);
        self
    }

    fn validate(&self) -> Result<(), SodexError> {
        if self.quantity <= 0.0 {
            return Err(SodexError::InvalidOrder(
                "quantity must be positive".to_owned(),
            ));
        }
        if self.order_type == OrderType::Limit && self.price.is_none() {
            return Err(SodexError::InvalidOrder(
                "limit orders require a price".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Client for the futures REST API under `/fut/v1`.
pub struct FuturesClient<R = crate::core::kernel::ReqwestRest> {
    rest: R,
    listen_key_ttl: Duration,
}

impl FuturesClient {
    pub fn new(config: &SodexConfig) -> Result<Self, SodexError> {
        let signer: Arc<dyn crate::core::kernel::Signer> = Arc::new(SodexSigner::new(
            config.api_key().to_owned(),
            config.secret_key().to_owned(),
        )?);
        let rest = RestClientBuilder::new(RestClientConfig::new(
            config.futures_rest_url.clone(),
            "sodex-futures".to_owned(),
        ).with_timeout(config.timeout_seconds))
        .with_signer(signer)
        .build()?;
        Ok(Self {
            rest,
            listen_key_ttl: DEFAULT_LISTEN_KEY_TTL,
        })
    }
}

impl<R: RestClient> FuturesClient<R> {
    pub fn with_transport(rest: R) -> Self {
        Self {
            rest,
            listen_key_ttl: DEFAULT_LISTEN_KEY_TTL,
        }
    }

    #[must_use]
    pub fn with_listen_key_ttl(mut self, ttl: Duration) -> Self {
        self.listen_key_ttl = ttl;
        self
    }

    pub async fn server_time(&self) -> Result<i64, SodexError> {
        let data = self
            .rest
            .get(&format!("{BASE}/public/time"), &[], false)
            .await?;
        data.as_i64()
            .or_else(|| data.get("serverTime").and_then(Value::as_i64))
            .ok_or_else(|| SodexError::Deserialization("server time payload".to_owned()))
    }

    pub async fn get_symbol_detail(&self, symbol: &str) -> Result<FuturesSymbol, SodexError> {
        let symbol = to_wire_symbol(symbol);
        self.rest
            .get_json(
                &format!("{BASE}/public/symbol/detail"),
                &[("symbol", symbol.as_str())],
                false,
            )
            .await
    }

    pub async fn get_ticker(&self, symbol: &str) -> Result<FuturesTicker, SodexError> {
        let symbol = to_wire_symbol(symbol);
        self.rest
            .get_json(
                &format!("{BASE}/public/q/ticker"),
                &[("symbol", symbol.as_str())],
                false,
            )
            .await
    }

    pub async fn get_tickers(&self) -> Result<Vec<FuturesTicker>, SodexError> {
        self.rest
            .get_json(&format!("{BASE}/public/q/tickers"), &[], false)
            .await
    }

    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        limit: u32,
    ) -> Result<Vec<FuturesKline>, SodexError> {
        let symbol = to_wire_symbol(symbol);
        let limit = limit.to_string();
        self.rest
            .get_json(
                &format!("{BASE}/public/q/kline"),
                &[
                    ("symbol", symbol.as_str()),
                    ("interval", interval.as_str()),
                    ("limit", limit.as_str()),
                ],
                false,
            )
            .await
    }

    pub async fn get_orderbook(
        &self,
        symbol: &str,
        level: u32,
    ) -> Result<FuturesOrderbook, SodexError> {
        let symbol = to_wire_symbol(symbol);
        let level = level.to_string();
        self.rest
            .get_json(
                &format!("{BASE}/public/q/depth"),
                &[("symbol", symbol.as_str()), ("level", level.as_str())],
                false,
            )
            .await
    }

    pub async fn get_recent_trades(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<FuturesTrade>, SodexError> {
        let symbol = to_wire_symbol(symbol);
        let limit = limit.to_string();
        self.rest
            .get_json(
                &format!("{BASE}/public/q/deal"),
                &[("symbol", symbol.as_str()), ("num", limit.as_str())],
                false,
            )
            .await
    }

    pub async fn get_balances(&self) -> Result<Vec<FuturesBalance>, SodexError> {
        self.rest
            .get_json(&format!("{BASE}/balance/list"), &[], true)
            .await
    }

    /// Place an order and return its exchange order id.
    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    pub async fn place_order(&self, request: &FuturesOrderRequest) -> Result<String, SodexError> {
        request.validate()?;

        let symbol = to_wire_symbol(&request.symbol);
        let quantity = request.quantity.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("symbol", symbol.as_str()),
            ("orderSide", request.side.as_str()),
            ("orderType", request.order_type.as_str()),
            ("positionSide", request.position_side.as_str()),
            ("origQty", quantity.as_str()),
        ];
        let price = request.price.map(|p| p.to_string());
        if let Some(ref p) = price {
            params.push(("price", p.as_str()));
        }
        if let Some(ref id) = request.client_order_id {
            params.push(("clientOrderId", id.as_str()));
        }
        let leverage = request.leverage.map(|l| l.to_string());
        if let Some(ref l) = leverage {
            params.push(("leverage", l.as_str()));
        }
        if let Some(tif) = request.time_in_force {
            params.push(("timeInForce", tif.as_str()));
        }
        if let Some(reduce_only) = request.reduce_only {
            params.push(("reduceOnly", if reduce_only { "true" } else { "false" }));
        }
        let take_profit = request.trigger_profit_price.map(|p| p.to_string());
        if let Some(ref p) = take_profit {
            params.push(("triggerProfitPrice", p.as_str()));
        }
        let stop_loss = request.trigger_stop_price.map(|p| p.to_string());
        if let Some(ref p) = stop_loss {
            params.push(("triggerStopPrice", p.as_str()));
        }

        let data = self
            .rest
            .post(&format!("{BASE}/order/create"), &params, true)
            .await?;
        order_id_from(&data)
    }

    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: &str) -> Result<(), SodexError> {
        self.rest
            .post(&format!("{BASE}/order/cancel"), &[("orderId", order_id)], true)
            .await?;
        Ok(())
    }

    /// Cancel up to twenty orders in one call.
    #[instrument(skip_all, fields(count = order_ids.len()))]
    pub async fn batch_cancel_orders(&self, order_ids: &[&str]) -> Result<(), SodexError> {
        if order_ids.is_empty() {
            return Ok(());
        }
        if order_ids.len() > MAX_BATCH_CANCEL {
            return Err(SodexError::InvalidOrder(format!(
                "batch cancel is capped at {MAX_BATCH_CANCEL} orders"
            )));
        }
        let payload = serde_json::to_string(order_ids)?;
        self.rest
            .post(
                &format!("{BASE}/order/cancel-batch"),
                &[("orderIds", payload.as_str())],
                true,
            )
            .await?;
        Ok(())
    }

    pub async fn get_order(&self, order_id: &str) -> Result<FuturesOrder, SodexError> {
        self.rest
            .get_json(
                &format!("{BASE}/order/detail"),
                &[("orderId", order_id)],
                true,
            )
            .await
    }

    /// All resting orders, walking every page of the unfilled and
    /// partially-filled listings.
    pub async fn get_open_orders(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<FuturesOrder>, SodexError> {
        let symbol = symbol.map(to_wire_symbol);
        let mut orders = Vec::new();
        for state in OPEN_ORDER_STATES {
            let mut page = 1i64;
            loop {
                let page_param = page.to_string();
                let size_param = PAGE_SIZE.to_string();
                let mut params: Vec<(&str, &str)> = vec![
                    ("state", state),
                    ("page", page_param.as_str()),
                    ("size", size_param.as_str()),
                ];
                if let Some(ref s) = symbol {
                    params.push(("symbol", s.as_str()));
                }
                let listing: Page<FuturesOrder> = self
                    .rest
                    .get_json(&format!("{BASE}/order/list"), &params, true)
                    .await?;
                let more = listing.has_more();
                orders.extend(listing.items);
                if !more {
                    break;
                }
                page += 1;
            }
        }
        Ok(orders)
    }

    pub async fn get_order_fills(&self, order_id: &str) -> Result<Vec<FuturesFill>, SodexError> {
        self.rest
            .get_json(
                &format!("{BASE}/order/trade-list"),
                &[("orderId", order_id)],
                true,
            )
            .await
    }

    /// Obtain a user-stream listen key.
    pub async fn get_listen_key(&self) -> Result<String, SodexError> {
        let data = self
            .rest
            .get(&format!("{BASE}/user/listen-key"), &[], true)
            .await?;
        listen_key_from(&data)
    }

    /// Extend the TTL of an existing listen key.
    pub async fn keepalive_listen_key(&self, listen_key: &str) -> Result<(), SodexError> {
        self.rest
            .put(
                &format!("{BASE}/user/listen-key"),
                &[("listenKey", listen_key)],
                true,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<R: RestClient> ListenKeyProvider for FuturesClient<R> {
    async fn fetch_listen_key(&self) -> Result<ListenKey, SodexError> {
        let value = self.get_listen_key().await?;
        Ok(ListenKey::new(value, self.listen_key_ttl))
    }

    async fn renew_listen_key(&self, key: &ListenKey) -> Result<ListenKey, SodexError> {
        self.keepalive_listen_key(&key.value).await?;
        Ok(ListenKey::new(key.value.clone(), self.listen_key_ttl))
    }
}

fn order_id_from(data: &Value) -> Result<String, SodexError> {
    match data {
        Value::String(id) => Ok(id.clone()),
        Value::Number(id) => Ok(id.to_string()),
        Value::Object(map) => map
            .get("orderId")
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| SodexError::Deserialization("order id missing".to_owned())),
        _ => Err(SodexError::Deserialization(
            "unexpected order create payload".to_owned(),
        )),
    }
}

fn listen_key_from(data: &Value) -> Result<String, SodexError> {
    match data {
        Value::String(key) => Ok(key.clone()),
        Value::Object(map) => map
            .get("listenKey")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| SodexError::Deserialization("listen key missing".to_owned())),
        _ => Err(SodexError::Deserialization(
            "unexpected listen key payload".to_owned(),
        )),
    }
}
