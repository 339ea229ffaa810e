use super::{PriceAdapter, ProviderDescriptor, symbol::CanonicalSymbol};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use std::{marker::PhantomData, time::Duration};
use tracing::trace;

/// Maximum number of response body characters kept in a status error.
const ERROR_BODY_LIMIT: usize = 100;

/// Request and response shape of one provider's spot price endpoint.
pub trait PriceEndpoint: Send + Sync + 'static {
    type Response: DeserializeOwned + Send;

    /// Full request url for `symbol`, given the descriptor's base endpoint.
    fn url(base: &str, symbol: &CanonicalSymbol) -> Result<String, ProviderError>;

    /// Validate the decoded response and pull the last traded price out of it.
    fn extract(response: Self::Response, symbol: &CanonicalSymbol) -> Result<f64, ProviderError>;
}

/// [`PriceAdapter`] issuing a single JSON GET against a [`PriceEndpoint`].
#[derive(Debug)]
pub struct RestPriceAdapter<E> {
    descriptor: ProviderDescriptor,
    client: reqwest::Client,
    endpoint: PhantomData<fn() -> E>,
}

impl<E> RestPriceAdapter<E> {
    pub fn new(descriptor: ProviderDescriptor, client: reqwest::Client) -> Self {
        Self {
            descriptor,
            client,
            endpoint: PhantomData,
        }
    }
}

#[async_trait]
impl<E> PriceAdapter for RestPriceAdapter<E>
where
    E: PriceEndpoint,
{
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn fetch_price(
        &self,
        symbol: &CanonicalSymbol,
        timeout: Duration,
    ) -> Result<f64, ProviderError> {
        let url = E::url(self.descriptor.base_endpoint.trim_end_matches('/'), symbol)?;
        trace!(provider = %self.descriptor.name, %url, "requesting price");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ProviderError::Timeout(timeout)
                } else {
                    ProviderError::from(error)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        let decoded = response.json::<E::Response>().await?;
        E::extract(decoded, symbol)
    }
}

/// Parse a decimal price string, rejecting non-finite and non-positive values.
pub fn parse_price(raw: &str, field: &str) -> Result<f64, ProviderError> {
    let price = raw
        .trim()
        .parse::<f64>()
        .map_err(|error| ProviderError::Malformed(format!("{field}: {error} ({raw:?})")))?;
    validate_price(price, field)
}

pub fn validate_price(price: f64, field: &str) -> Result<f64, ProviderError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(ProviderError::Malformed(format!("{field}: invalid price {price}")))
    }
}
