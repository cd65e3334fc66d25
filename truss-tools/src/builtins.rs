//! ABOUTME: Built-in tools ported from the original activity stubs: a web
//! ABOUTME: search and a stock-price lookup, both offline-safe by default

use crate::ToolHandler;
use async_trait::async_trait;
use truss_core::{Result, ToolResultContent, TrussError};

/// Web search tool. Calls out to serper.dev when an API key is configured;
/// otherwise returns a deterministic stub result so the dispatch path can
/// be exercised without network access or secrets.
pub struct WebSearchTool {
    client: reqwest::Client,
}

impl WebSearchTool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn api_key() -> Option<String> {
        std::env::var("SERPER_API_KEY")
            .ok()
            .or_else(|| std::env::var("GOOGLE_SEARCH_API_KEY").ok())
            .filter(|key| !key.is_empty())
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web for a query and returns a list of results"
    }

    async fn call(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResultContent> {
        let query = args
            .get("query")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| TrussError::invalid_input("web_search requires a 'query' argument"))?
            .to_string();
        let page = args
            .get("page")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(1);

        let Some(api_key) = Self::api_key() else {
            return Ok(ToolResultContent::Json(serde_json::json!({
                "results": [{
                    "title": format!("Stub result for '{query}' (page {page})"),
                    "link": "https://example.com",
                    "snippet": "No SERPER_API_KEY configured; this is a stub response.",
                }],
            })));
        };

        let response = self
            .client
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", api_key)
            .json(&serde_json::json!({ "q": query, "page": page }))
            .send()
            .await
            .map_err(|e| TrussError::ToolExecutionFailed {
                name: self.name().to_string(),
                message: format!("serper.dev request failed: {e}"),
            })?;
        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| TrussError::ToolExecutionFailed {
                    name: self.name().to_string(),
                    message: format!("serper.dev returned invalid JSON: {e}"),
                })?;
        Ok(ToolResultContent::Json(body))
    }
}

/// Stock price lookup tool. Calls Alpha Vantage when configured; otherwise
/// returns a `source: "stub"` payload with a null price, matching the
/// original activity's offline behaviour exactly.
pub struct GetStockPriceTool {
    client: reqwest::Client,
}

impl GetStockPriceTool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn api_key() -> Option<String> {
        std::env::var("ALPHAVANTAGE_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
    }
}

impl Default for GetStockPriceTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for GetStockPriceTool {
    fn name(&self) -> &str {
        "get_stock_price"
    }

    fn description(&self) -> &str {
        "Looks up the latest price for a stock ticker symbol"
    }

    async fn call(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResultContent> {
        let ticker_symbol = args
            .get("ticker_symbol")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                TrussError::invalid_input("get_stock_price requires a 'ticker_symbol' argument")
            })?
            .to_string();

        let Some(api_key) = Self::api_key() else {
            return Ok(ToolResultContent::Json(serde_json::json!({
                "ticker": ticker_symbol,
                "price": null,
                "source": "stub",
            })));
        };

        let url = format!(
            "https://www.alphavantage.co/query?function=GLOBAL_QUOTE&symbol={ticker_symbol}&apikey={api_key}"
        );
        let response = self.client.get(&url).send().await.map_err(|e| {
            TrussError::ToolExecutionFailed {
                name: self.name().to_string(),
                message: format!("alphavantage request failed: {e}"),
            }
        })?;
        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| TrussError::ToolExecutionFailed {
                    name: self.name().to_string(),
                    message: format!("alphavantage returned invalid JSON: {e}"),
                })?;
        let price = body
            .get("Global Quote")
            .and_then(|quote| quote.get("05. price"))
            .and_then(serde_json::Value::as_str)
            .and_then(|price| price.parse::<f64>().ok());
        Ok(ToolResultContent::Json(serde_json::json!({
            "ticker": ticker_symbol,
            "price": price,
            "source": "alphavantage",
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn web_search_returns_stub_without_api_key() {
        std::env::remove_var("SERPER_API_KEY");
        std::env::remove_var("GOOGLE_SEARCH_API_KEY");
        let tool = WebSearchTool::new();
        let mut args = serde_json::Map::new();
        args.insert("query".into(), serde_json::json!("rust async traits"));
        let result = tool.call(args).await.unwrap();
        let ToolResultContent::Json(value) = result else {
            panic!("expected json content");
        };
        let snippet = value["results"][0]["snippet"].as_str().unwrap();
        assert!(snippet.contains("No SERPER_API_KEY configured"));
    }

    #[tokio::test]
    #[serial]
    async fn get_stock_price_returns_stub_without_api_key() {
        std::env::remove_var("ALPHAVANTAGE_API_KEY");
        let tool = GetStockPriceTool::new();
        let mut args = serde_json::Map::new();
        args.insert("ticker_symbol".into(), serde_json::json!("AAPL"));
        let result = tool.call(args).await.unwrap();
        let ToolResultContent::Json(value) = result else {
            panic!("expected json content");
        };
        assert_eq!(value["source"], "stub");
        assert!(value["price"].is_null());
        assert_eq!(value["ticker"], "AAPL");
    }

    #[tokio::test]
    async fn web_search_rejects_missing_query() {
        let tool = WebSearchTool::new();
        let err = tool.call(serde_json::Map::new()).await.unwrap_err();
        assert!(matches!(err, TrussError::InvalidInput { .. }));
    }
}
