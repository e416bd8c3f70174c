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
use crate::core::types::{to_wire_symbol, KlineInterval, OrderSide, OrderType};
use crate::spot::types::{
    Balance, Kline, Order, OrderFill, Orderbook, Page, SymbolInfo, Ticker, Trade,
};

const BASE: &str = "/spot/v1";
const SYMBOL_LIST: &str = "/pro/p/symbol/list";
const OPEN_ORDER_STATES: [&str; 2] = ["1", "2"];
const PAGE_SIZE: i64 = 100;

/// One entry of a batch order submission.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOrder {
    pub symbol: String,
    pub direction: OrderSide,
    pub price: String,
    pub total_amount: String,
    pub trade_type: OrderType,
}

impl BatchOrder {
    /// A limit order entry with exchange-conventional formatting.
    #[must_use]
    pub fn limit(symbol: &str, side: OrderSide, quantity: f64, price: f64) -> Self {
        Self {
            symbol: to_wire_symbol(symbol),
            direction: side,
            price: format_price(price),
            total_amount: format_quantity(quantity),
            trade_type: OrderType::Limit,
        }
    }
}

/// Client for the spot REST API.
///
/// Market data lives under `/spot/v1/p`, account endpoints under
/// `/spot/v1/u`. Symbol configuration comes from a separate extended
/// gateway, hence the second REST client.
pub struct SpotClient<R = crate::core::kernel::ReqwestRest> {
    rest: R,
    ext_rest: R,
    listen_key_ttl: Duration,
}

impl SpotClient {
    /// Build a client from configuration, wiring up HMAC signing.
    pub fn new(config: &SodexConfig) -> Result<Self, SodexError> {
        let signer: Arc<dyn crate::core::kernel::Signer> = Arc::new(SodexSigner::new(
            config.api_key().to_owned(),
            config.secret_key().to_owned(),
        )?);
        let rest = RestClientBuilder::new(RestClientConfig::new(
            config.spot_rest_url.clone(),
            "sodex-spot".to_owned(),
        ).with_timeout(config.timeout_seconds))
        .with_signer(Arc::clone(&signer))
        .build()?;
        let ext_rest = RestClientBuilder::new(RestClientConfig::new(
            config.spot_rest_url_ext.clone(),
            "sodex-spot-ext".to_owned(),
        ).with_timeout(config.timeout_seconds))
        .with_signer(signer)
        .build()?;
        Ok(Self {
            rest,
            ext_rest,
            listen_key_ttl: DEFAULT_LISTEN_KEY_TTL,
        })
    }
}

impl<R: RestClient> SpotClient<R> {
    /// Build a client over explicit REST transports, e.g. for tests.
    pub fn with_transports(rest: R, ext_rest: R) -> Self {
        Self {
            rest,
            ext_rest,
            listen_key_ttl: DEFAULT_LISTEN_KEY_TTL,
        }
    }

    #[must_use]
    pub fn with_listen_key_ttl(mut self, ttl: Duration) -> Self {
        self.listen_key_ttl = ttl;
        self
    }

    /// Current server time in epoch milliseconds.
    pub async fn server_time(&self) -> Result<i64, SodexError> {
        let data = self
            .rest
            .get(&format!("{BASE}/p/time"), &[], false)
            .await?;
        data.as_i64()
            .or_else(|| data.get("serverTime").and_then(Value::as_i64))
            .ok_or_else(|| SodexError::Deserialization("server time payload".to_owned()))
    }

    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        limit: u32,
    ) -> Result<Vec<Kline>, SodexError> {
        let symbol = to_wire_symbol(symbol);
        let limit = limit.to_string();
        self.rest
            .get_json(
                &format!("{BASE}/p/quotation/kline"),
                &[
                    ("symbol", symbol.as_str()),
                    ("interval", interval.as_str()),
                    ("limit", limit.as_str()),
                ],
                false,
            )
            .await
    }

    pub async fn get_ticker(&self, symbol: &str) -> Result<Ticker, SodexError> {
        let symbol = to_wire_symbol(symbol);
        self.rest
            .get_json(
                &format!("{BASE}/p/quotation/trend/ticker"),
                &[("symbol", symbol.as_str())],
                false,
            )
            .await
    }

    pub async fn get_tickers(&self) -> Result<Vec<Ticker>, SodexError> {
        self.rest
            .get_json(&format!("{BASE}/p/quotation/tickers"), &[], false)
            .await
    }

    /// Orderbook snapshot. `level` caps the depth per side.
    pub async fn get_orderbook(&self, symbol: &str, level: u32) -> Result<Orderbook, SodexError> {
        let symbol = to_wire_symbol(symbol);
        let level = level.to_string();
        self.rest
            .get_json(
                &format!("{BASE}/p/quotation/depth"),
                &[("symbol", symbol.as_str()), ("level", level.as_str())],
                false,
            )
            .await
    }

    pub async fn get_recent_trades(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<Trade>, SodexError> {
        let symbol = to_wire_symbol(symbol);
        let limit = limit.to_string();
        self.rest
            .get_json(
                &format!("{BASE}/p/quotation/deal"),
                &[("symbol", symbol.as_str()), ("num", limit.as_str())],
                false,
            )
            .await
    }

    /// Symbol configuration from the extended gateway.
    pub async fn get_symbols(&self) -> Result<Vec<SymbolInfo>, SodexError> {
        self.ext_rest.get_json(SYMBOL_LIST, &[], false).await
    }

    pub async fn get_balances(&self) -> Result<Vec<Balance>, SodexError> {
        self.rest
            .get_json(&format!("{BASE}/u/balance/spot"), &[], true)
            .await
    }

    /// Balance for a single asset, `None` when the account holds none.
    /// The filter runs server-side via the `coin` parameter.
    pub async fn get_balance(&self, coin: &str) -> Result<Option<Balance>, SodexError> {
        let balances: Vec<Balance> = self
            .rest
            .get_json(&format!("{BASE}/u/balance/spot"), &[("coin", coin)], true)
            .await?;
        Ok(balances
            .into_iter()
            .find(|b| b.coin.eq_ignore_ascii_case(coin)))
    }

    /// Place a limit order and return its exchange order id.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        quantity: f64,
        price: f64,
    ) -> Result<String, SodexError> {
        if quantity <= 0.0 {
            return Err(SodexError::InvalidOrder(
                "quantity must be positive".to_owned(),
            ));
        }
        let symbol = to_wire_symbol(symbol);
        let price = format_price(price);
        let quantity = format_quantity(quantity);
        let data = self
            .rest
            .post(
                &format!("{BASE}/u/trade/order/create"),
                &[
                    ("direction", side.as_str()),
                    ("price", price.as_str()),
                    ("symbol", symbol.as_str()),
                    ("totalAmount", quantity.as_str()),
                    ("tradeType", order_type.as_str()),
                ],
                true,
            )
            .await?;
        order_id_from(&data)
    }

    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: &str) -> Result<(), SodexError> {
        self.rest
            .post(
                &format!("{BASE}/u/trade/order/cancel"),
                &[("orderId", order_id)],
                true,
            )
            .await?;
        Ok(())
    }

    /// Submit several orders in one call. Returns the created order ids
    /// in submission order.
    #[instrument(skip_all, fields(count = orders.len()))]
    pub async fn batch_place_orders(
        &self,
        orders: &[BatchOrder],
    ) -> Result<Vec<String>, SodexError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        let payload = serde_json::to_string(orders)?;
        let data = self
            .rest
            .post(
                &format!("{BASE}/u/trade/order/batch/create"),
                &[("ordersJsonStr", payload.as_str())],
                true,
            )
            .await?;
        let ids = match data {
            Value::Array(entries) => entries
                .iter()
                .map(order_id_from)
                .collect::<Result<Vec<_>, _>>()?,
            other => vec![order_id_from(&other)?],
        };
        Ok(ids)
    }

    #[instrument(skip_all, fields(count = order_ids.len()))]
    pub async fn batch_cancel_orders(&self, order_ids: &[&str]) -> Result<(), SodexError> {
        if order_ids.is_empty() {
            return Ok(());
        }
        let payload = serde_json::to_string(order_ids)?;
        self.rest
            .post(
                &format!("{BASE}/u/trade/order/batch/cancel"),
                &[("orderIdsJson", payload.as_str())],
                true,
            )
            .await?;
        Ok(())
    }

    /// Cancel every resting order, optionally scoped to one symbol.
    /// Returns the number of orders cancelled.
    #[instrument(skip(self))]
    pub async fn cancel_all_orders(&self, symbol: Option<&str>) -> Result<usize, SodexError> {
        let open = self.get_open_orders(symbol).await?;
        if open.is_empty() {
            return Ok(0);
        }
        let ids: Vec<&str> = open.iter().map(|o| o.order_id.as_str()).collect();
        self.batch_cancel_orders(&ids).await?;
        Ok(ids.len())
    }

    /// All resting orders, walking every page of the unfilled and
    /// partially-filled listings.
    pub async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, SodexError> {
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
                let listing: Page<Order> = self
                    .rest
                    .get_json(&format!("{BASE}/u/trade/order/list"), &params, true)
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

    pub async fn get_order_history(
        &self,
        symbol: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Order>, SodexError> {
        let symbol = symbol.map(to_wire_symbol);
        let limit = limit.to_string();
        let mut params: Vec<(&str, &str)> = vec![("limit", limit.as_str())];
        if let Some(ref s) = symbol {
            params.push(("symbol", s.as_str()));
        }
        let listing: Page<Order> = self
            .rest
            .get_json(&format!("{BASE}/u/trade/order/history"), &params, true)
            .await?;
        Ok(listing.items)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order, SodexError> {
        self.rest
            .get_json(
                &format!("{BASE}/u/trade/order/detail"),
                &[("orderId", order_id)],
                true,
            )
            .await
    }

    pub async fn get_order_fills(&self, order_id: &str) -> Result<Vec<OrderFill>, SodexError> {
        self.rest
            .get_json(
                &format!("{BASE}/u/trade/order/deal"),
                &[("orderId", order_id)],
                true,
            )
            .await
    }

    /// Issue a WebSocket access token.
    pub async fn ws_token(&self) -> Result<String, SodexError> {
        let data = self
            .rest
            .get(&format!("{BASE}/u/ws/token"), &[], true)
            .await?;
        token_from(&data)
    }
}

#[async_trait]
impl<R: RestClient> ListenKeyProvider for SpotClient<R> {
    async fn fetch_listen_key(&self) -> Result<ListenKey, SodexError> {
        let token = self.ws_token().await?;
        Ok(ListenKey::new(token, self.listen_key_ttl))
    }

    // The token endpoint has no keepalive form; renewal is a re-issue.
    async fn renew_listen_key(&self, _key: &ListenKey) -> Result<ListenKey, SodexError> {
        self.fetch_listen_key().await
    }
}

fn format_price(price: f64) -> String {
    format!("{price:.2}")
}

fn format_quantity(quantity: f64) -> String {
    format!("{quantity:.4}")
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

fn token_from(data: &Value) -> Result<String, SodexError> {
    match data {
        Value::String(token) => Ok(token.clone()),
        Value::Object(map) => map
            .get("token")
            .or_else(|| map.get("listenKey"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| SodexError::Deserialization("ws token missing".to_owned())),
        _ => Err(SodexError::Deserialization(
            "unexpected ws token payload".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    type RecordedCall = (&'static str, String, Vec<(String, String)>, bool);

    /// REST fake that records every call and replays a scripted payload.
    #[derive(Clone)]
    struct RecordingRest {
        calls: Arc<Mutex<Vec<RecordedCall>>>,
        response: Value,
    }

    impl RecordingRest {
        fn new(response: Value) -> Self {
            Self {
                calls: Arc::default(),
                response,
            }
        }

        fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        fn record(
            &self,
            method: &'static str,
            endpoint: &str,
            params: &[(&str, &str)],
            signed: bool,
        ) -> Value {
            let params = params
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect();
            self.calls
                .lock()
                .unwrap()
                .push((method, endpoint.to_owned(), params, signed));
            self.response.clone()
        }
    }

    #[async_trait]
    impl RestClient for RecordingRest {
        async fn get(
            &self,
            endpoint: &str,
            query_params: &[(&str, &str)],
            signed: bool,
        ) -> Result<Value, SodexError> {
            Ok(self.record("GET", endpoint, query_params, signed))
        }

        async fn get_json<T: serde::de::DeserializeOwned>(
            &self,
            endpoint: &str,
            query_params: &[(&str, &str)],
            signed: bool,
        ) -> Result<T, SodexError> {
            serde_json::from_value(self.record("GET", endpoint, query_params, signed))
                .map_err(Into::into)
        }

        async fn post(
            &self,
            endpoint: &str,
            query_params: &[(&str, &str)],
            signed: bool,
        ) -> Result<Value, SodexError> {
            Ok(self.record("POST", endpoint, query_params, signed))
        }

        async fn post_json<T: serde::de::DeserializeOwned>(
            &self,
            endpoint: &str,
            query_params: &[(&str, &str)],
            signed: bool,
        ) -> Result<T, SodexError> {
            serde_json::from_value(self.record("POST", endpoint, query_params, signed))
                .map_err(Into::into)
        }

        async fn put(
            &self,
            endpoint: &str,
            query_params: &[(&str, &str)],
            signed: bool,
        ) -> Result<Value, SodexError> {
            Ok(self.record("PUT", endpoint, query_params, signed))
        }

        async fn delete(
            &self,
            endpoint: &str,
            query_params: &[(&str, &str)],
            signed: bool,
        ) -> Result<Value, SodexError> {
            Ok(self.record("DELETE", endpoint, query_params, signed))
        }
    }

    #[tokio::test]
    async fn ws_token_is_fetched_with_get() {
        let rest = RecordingRest::new(json!("tok"));
        let client = SpotClient::with_transports(rest.clone(), rest.clone());

        let token = client.ws_token().await.unwrap();

        assert_eq!(token, "tok");
        let calls = rest.calls();
        assert_eq!(calls.len(), 1);
        let (method, endpoint, params, signed) = &calls[0];
        assert_eq!(*method, "GET");
        assert_eq!(endpoint, "/spot/v1/u/ws/token");
        assert!(params.is_empty());
        assert!(signed);
    }

    #[tokio::test]
    async fn get_balance_filters_server_side() {
        let rest = RecordingRest::new(json!([
            {"coin": "USDT", "availableBalance": "10", "freeze": "1"}
        ]));
        let client = SpotClient::with_transports(rest.clone(), rest.clone());

        let balance = client.get_balance("usdt").await.unwrap().unwrap();

        assert_eq!(balance.available, 10.0);
        let (method, endpoint, params, signed) = &rest.calls()[0];
        assert_eq!(*method, "GET");
        assert_eq!(endpoint, "/spot/v1/u/balance/spot");
        assert_eq!(params, &[("coin".to_owned(), "usdt".to_owned())]);
        assert!(signed);
    }

    #[test]
    fn batch_order_serializes_with_wire_keys() {
        let order = BatchOrder::limit("BTCUSDT", OrderSide::Buy, 0.015, 27500.5);
        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(
            value,
            json!({
                "symbol": "btc_usdt",
                "direction": "BUY",
                "price": "27500.50",
                "totalAmount": "0.0150",
                "tradeType": "LIMIT",
            })
        );
    }

    #[test]
    fn order_id_from_accepts_all_shapes() {
        assert_eq!(order_id_from(&json!("abc")).unwrap(), "abc");
        assert_eq!(order_id_from(&json!(42)).unwrap(), "42");
        assert_eq!(order_id_from(&json!({"orderId": "xyz"})).unwrap(), "xyz");
        assert_eq!(order_id_from(&json!({"orderId": 7})).unwrap(), "7");
        assert!(order_id_from(&json!(null)).is_err());
    }

    #[test]
    fn token_from_accepts_string_and_object() {
        assert_eq!(token_from(&json!("tok")).unwrap(), "tok");
        assert_eq!(token_from(&json!({"token": "tok"})).unwrap(), "tok");
        assert_eq!(token_from(&json!({"listenKey": "lk"})).unwrap(), "lk");
        assert!(token_from(&json!(12)).is_err());
    }
}
