//! Gas fee derivation and unit scaling
//!
//! Fees are computed in base units as `gas_price * gas_used` and then scaled
//! to display units: Gwei for gas prices, the native display unit (18
//! decimals) for fees and balances.

use crate::types::{Receipt, Transaction};
use alloy_primitives::{B256, U256};
use serde::Serialize;

/// Decimals between base units and Gwei.
pub const GWEI_DECIMALS: u8 = 9;

/// Decimals between base units and the native display unit.
pub const NATIVE_DECIMALS: u8 = 18;

/// Fee facts for one transaction with a known receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeRecord {
    #[serde(rename = "txn_id")]
    pub hash: B256,
    pub gas_price_gwei: f64,
    pub gas_used: u64,
    #[serde(rename = "txn_fee_eth")]
    pub fee_native: f64,
}

/// Scale a base-unit amount down by `10^decimals`.
///
/// Whole and fractional parts are converted separately so large amounts keep
/// their low digits.
pub fn scale_down(amount: U256, decimals: u8) -> f64 {
    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / divisor;
    let frac = amount % divisor;
    decimal_to_f64(whole) + decimal_to_f64(frac) / 10f64.powi(i32::from(decimals))
}

fn decimal_to_f64(value: U256) -> f64 {
    value.to_string().parse().unwrap_or(f64::NAN)
}

/// Gas price paid by a transaction, in base units.
///
/// Prefers the transaction's own `gasPrice`, falling back to the receipt's
/// `effectiveGasPrice` for nodes that omit it on typed transactions.
pub fn gas_price(tx: &Transaction, receipt: &Receipt) -> Option<U256> {
    tx.gas_price.or(receipt.effective_gas_price)
}

/// Total fee in base units: `gas_price * gas_used`.
pub fn calculate_fee(gas_price: U256, gas_used: u64) -> U256 {
    gas_price.saturating_mul(U256::from(gas_used))
}

/// Derive the fee record for a transaction, `None` if no gas price is known.
pub fn fee_record(tx: &Transaction, receipt: &Receipt) -> Option<FeeRecord> {
    let price = gas_price(tx, receipt)?;
    let fee = calculate_fee(price, receipt.gas_used);
    Some(FeeRecord {
        hash: tx.hash,
        gas_price_gwei: scale_down(price, GWEI_DECIMALS),
        gas_used: receipt.gas_used,
        fee_native: scale_down(fee, NATIVE_DECIMALS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    fn create_tx(gas_price: Option<U256>) -> Transaction {
        Transaction {
            hash: b256!("00000000000000000000000000000000000000000000000000000000000000f1"),
            from: address!("0000000000000000000000000000000000000001"),
            to: Some(address!("0000000000000000000000000000000000000002")),
            value: U256::from(1u64),
            gas_price,
        }
    }

    fn create_receipt(gas_used: u64, effective_gas_price: Option<U256>) -> Receipt {
        Receipt {
            transaction_hash: b256!(
                "00000000000000000000000000000000000000000000000000000000000000f1"
            ),
            gas_used,
            effective_gas_price,
        }
    }

    #[test]
    fn test_fee_derivation() {
        let tx = create_tx(Some(U256::from(2_000_000_000u64))); // 2 gwei
        let receipt = create_receipt(21000, None);

        let record = fee_record(&tx, &receipt).unwrap();
        assert_eq!(record.gas_price_gwei, 2.0);
        assert_eq!(record.gas_used, 21000);
        // 2_000_000_000 * 21000 = 42_000_000_000_000 base units
        assert_eq!(record.fee_native, 42_000_000_000_000f64 / 1e18);
    }

    #[test]
    fn test_receipt_price_used_when_tx_has_none() {
        let tx = create_tx(None);
        let receipt = create_receipt(50_000, Some(U256::from(3_000_000_000u64)));

        let record = fee_record(&tx, &receipt).unwrap();
        assert_eq!(record.gas_price_gwei, 3.0);
        assert_eq!(calculate_fee(U256::from(3_000_000_000u64), 50_000), U256::from(150_000_000_000_000u64));
    }

    #[test]
    fn test_no_price_means_no_record() {
        let tx = create_tx(None);
        let receipt = create_receipt(21000, None);
        assert!(fee_record(&tx, &receipt).is_none());
    }

    #[test]
    fn test_scale_down_keeps_whole_part() {
        // 1234.5 native units
        let amount = U256::from(1_234_500_000_000_000_000_000u128);
        assert_eq!(scale_down(amount, NATIVE_DECIMALS), 1234.5);
        assert_eq!(scale_down(U256::ZERO, GWEI_DECIMALS), 0.0);
        assert_eq!(scale_down(U256::from(1_500_000_000u64), GWEI_DECIMALS), 1.5);
    }
}
