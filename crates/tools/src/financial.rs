//! Financial data tools backed by the Financial Modeling Prep API.
//!
//! Each endpoint is its own tool. Statement endpoints take `limit` (default 3)
//! and `period` (default `FY`).

use async_trait::async_trait;
use std::time::Duration;
use toolchat_core::error::ToolError;
use toolchat_core::tool::{Tool, ToolResult};
use tracing::debug;

pub const FMP_BASE_URL: &str = "https://financialmodelingprep.com/stable";
const DEFAULT_LIMIT: u64 = 3;
const DEFAULT_PERIOD: &str = "FY";

/// The API endpoints exposed as tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinancialEndpoint {
    CompanyProfile,
    BalanceSheet,
    CashFlow,
    KeyMetrics,
    FinancialRatios,
    StockQuote,
}

impl FinancialEndpoint {
    pub const ALL: [Self; 6] = [
        Self::CompanyProfile,
        Self::BalanceSheet,
        Self::CashFlow,
        Self::KeyMetrics,
        Self::FinancialRatios,
        Self::StockQuote,
    ];

    pub fn tool_name(self) -> &'static str {
        match self {
            Self::CompanyProfile => "get_company_profile",
            Self::BalanceSheet => "get_balance_sheet",
            Self::CashFlow => "get_cash_flow",
            Self::KeyMetrics => "get_key_metrics",
            Self::FinancialRatios => "get_financial_ratios",
            Self::StockQuote => "get_stock_quote",
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::CompanyProfile => "profile",
            Self::BalanceSheet => "balance-sheet-statement",
            Self::CashFlow => "cash-flow-statement",
            Self::KeyMetrics => "key-metrics",
            Self::FinancialRatios => "ratios",
            Self::StockQuote => "quote",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::CompanyProfile => "Get company profile data for a given stock symbol.",
            Self::BalanceSheet => "Get balance sheet data for a given stock symbol.",
            Self::CashFlow => "Get cash flow statement data for a given stock symbol.",
            Self::KeyMetrics => "Get key financial metrics for a given stock symbol.",
            Self::FinancialRatios => "Get financial ratios for a given stock symbol.",
            Self::StockQuote => "Get real-time stock quote for a given stock symbol.",
        }
    }

    /// Whether the endpoint returns a series of statements.
    fn is_periodic(self) -> bool {
        !matches!(self, Self::CompanyProfile | Self::StockQuote)
    }
}

pub struct FinancialDataTool {
    endpoint: FinancialEndpoint,
    api_key: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl FinancialDataTool {
    pub fn new(endpoint: FinancialEndpoint, api_key: impl Into<String>) -> Self {
        Self {
            endpoint,
            api_key: api_key.into(),
            base_url: FMP_BASE_URL.into(),
            timeout: crate::HTTP_TIMEOUT,
            client: crate::http_client(crate::HTTP_TIMEOUT),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = crate::http_client(timeout);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Query parameters for a call, without the API key.
    fn query(&self, arguments: &serde_json::Value) -> Result<Vec<(&'static str, String)>, ToolError> {
        let symbol = arguments["symbol"]
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::invalid_args(self.endpoint.tool_name(), "Missing 'symbol' argument"))?;

        let mut query = vec![("symbol", symbol.trim().to_uppercase())];
        if self.endpoint.is_periodic() {
            let limit = arguments["limit"].as_u64().unwrap_or(DEFAULT_LIMIT);
            let period = arguments["period"].as_str().unwrap_or(DEFAULT_PERIOD);
            query.push(("limit", limit.to_string()));
            query.push(("period", period.to_string()));
        }
        Ok(query)
    }
}

#[async_trait]
impl Tool for FinancialDataTool {
    fn name(&self) -> &str {
        self.endpoint.tool_name()
    }

    fn description(&self) -> &str {
        self.endpoint.description()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let mut schema = serde_json::json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Stock ticker symbol, e.g. AAPL" }
            },
            "required": ["symbol"]
        });
        if self.endpoint.is_periodic() {
            schema["properties"]["limit"] = serde_json::json!({
                "type": "integer",
                "description": "Number of periods to return",
                "default": DEFAULT_LIMIT
            });
            schema["properties"]["period"] = serde_json::json!({
                "type": "string",
                "description": "FY for annual or Q1-Q4 for a quarter",
                "default": DEFAULT_PERIOD
            });
        }
        schema
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = self.query(&arguments)?;
        let url = format!("{}/{}", self.base_url, self.endpoint.path());
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: self.endpoint.tool_name().into(),
            reason,
        };

        debug!(tool = self.endpoint.tool_name(), ?query, "Fetching financial data");
        let response = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .query(&query)
            .send()
            .await
            .map_err(|e| crate::request_error(self.endpoint.tool_name(), self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {}: {body}", status.as_u16())));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| failed(format!("invalid JSON: {e}")))?;
        let text = serde_json::to_string_pretty(&data).unwrap_or_default();
        Ok(ToolResult::ok(text).with_data(data))
    }
}

/// One tool per endpoint.
pub fn financial_tools(api_key: &str) -> Vec<FinancialDataTool> {
    FinancialEndpoint::ALL
        .into_iter()
        .map(|endpoint| FinancialDataTool::new(endpoint, api_key))
        .collect()
}
