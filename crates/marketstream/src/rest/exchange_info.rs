/*
[INPUT]:  Raw exchangeInfo response body (spot or futures)
[OUTPUT]: Instrument metadata keyed by upper-case symbol
[POS]:    REST layer - exchange info decoding
[UPDATE]: When exchangeInfo schema or filter handling changes
*/

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::Result;
use crate::types::InstrumentMetadata;

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolEntry {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    contract_type: Option<String>,
    #[serde(default)]
    price_precision: Option<u32>,
    #[serde(default)]
    quantity_precision: Option<u32>,
    #[serde(default)]
    base_asset_precision: Option<u32>,
    #[serde(default)]
    quote_precision: Option<u32>,
    #[serde(default)]
    delivery_date: Option<i64>,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum SymbolFilter {
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        #[serde(default, with = "rust_decimal::serde::str")]
        min_qty: Decimal,
        #[serde(default, with = "rust_decimal::serde::str")]
        max_qty: Decimal,
    },
    #[serde(other)]
    Other,
}

/// Decode an exchangeInfo body.
///
/// Futures report `pricePrecision`/`quantityPrecision`; spot only has
/// `quotePrecision`/`baseAssetPrecision`, which are used as fallbacks.
pub fn parse_exchange_info(body: &[u8]) -> Result<HashMap<String, Arc<InstrumentMetadata>>> {
    let response: ExchangeInfoResponse = serde_json::from_slice(body)?;
    let mut instruments = HashMap::with_capacity(response.symbols.len());

    for entry in response.symbols {
        let (min_qty, max_qty) = entry
            .filters
            .iter()
            .find_map(|filter| match filter {
                SymbolFilter::LotSize { min_qty, max_qty } => Some((*min_qty, *max_qty)),
                SymbolFilter::Other => None,
            })
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));
        let symbol = entry.symbol.to_ascii_uppercase();
        let metadata = InstrumentMetadata {
            symbol: symbol.clone(),
            base_asset: entry.base_asset,
            quote_asset: entry.quote_asset,
            price_precision: entry.price_precision.or(entry.quote_precision).unwrap_or(0),
            qty_precision: entry
                .quantity_precision
                .or(entry.base_asset_precision)
                .unwrap_or(0),
            min_qty,
            max_qty,
            contract_type: entry.contract_type.filter(|value| !value.is_empty()),
            delivery_date: entry.delivery_date,
        };
        instruments.insert(symbol, Arc::new(metadata));
    }

    Ok(instruments)
}
