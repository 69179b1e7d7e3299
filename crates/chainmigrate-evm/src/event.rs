//! `MigrationRegistered` log decoding.
//!
//! The event has three parameters, `(address caller, address migrationAddress,
//! uint256 amount)`. Indexed parameters are read from `topics[1..]` in
//! declaration order; the rest are ABI-decoded together from `data`.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{keccak256, U256};

use chainmigrate_core::chain::{LogFilter, RawLog};
use chainmigrate_core::config::EventLayout;
use chainmigrate_core::error::MigratorError;
use chainmigrate_core::types::CandidateMigration;

const PARAM_NAMES: [&str; 3] = ["caller", "migrationAddress", "amount"];

/// `0x`-prefixed keccak256 of an event signature, i.e. its topic0.
pub fn event_topic0(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

fn param_types() -> [DynSolType; 3] {
    [DynSolType::Address, DynSolType::Address, DynSolType::Uint(256)]
}

/// Decodes raw logs into [`CandidateMigration`] drafts.
#[derive(Debug, Clone)]
pub struct MigrationEventDecoder {
    topic0: String,
    indexed: [bool; 3],
}

impl MigrationEventDecoder {
    pub fn new(layout: &EventLayout) -> Result<Self, MigratorError> {
        let indexed: [bool; 3] = layout.indexed.as_slice().try_into().map_err(|_| {
            MigratorError::Config(format!(
                "event layout needs 3 indexed flags, got {}",
                layout.indexed.len()
            ))
        })?;
        Ok(Self {
            topic0: event_topic0(&layout.signature),
            indexed,
        })
    }

    pub fn topic0(&self) -> &str {
        &self.topic0
    }

    pub fn filter(&self) -> LogFilter {
        LogFilter {
            topic0: self.topic0.clone(),
        }
    }

    pub fn decode(&self, log: &RawLog) -> Result<CandidateMigration, MigratorError> {
        let topic0 = log
            .topics
            .first()
            .ok_or_else(|| MigratorError::Decode(format!("log in tx {} has no topics", log.tx_hash)))?;
        if !topic0.eq_ignore_ascii_case(&self.topic0) {
            return Err(MigratorError::Decode(format!(
                "log in tx {} has topic0 {topic0}, expected {}",
                log.tx_hash, self.topic0
            )));
        }

        let indexed_count = self.indexed.iter().filter(|i| **i).count();
        if log.topics.len() != indexed_count + 1 {
            return Err(MigratorError::Decode(format!(
                "log in tx {} has {} topics, expected {}",
                log.tx_hash,
                log.topics.len(),
                indexed_count + 1
            )));
        }

        let types = param_types();
        let data_types: Vec<DynSolType> = types
            .iter()
            .zip(self.indexed)
            .filter(|(_, indexed)| !indexed)
            .map(|(ty, _)| ty.clone())
            .collect();
        let mut data_values = decode_data(&log.data, data_types)?.into_iter();
        let mut topics = log.topics[1..].iter();

        let mut values = Vec::with_capacity(3);
        for (i, ty) in types.iter().enumerate() {
            let value = if self.indexed[i] {
                let topic = topics
                    .next()
                    .ok_or_else(|| MigratorError::Decode(format!("missing topic for {}", PARAM_NAMES[i])))?;
                decode_topic(topic, ty)?
            } else {
                data_values
                    .next()
                    .ok_or_else(|| MigratorError::Decode(format!("missing data for {}", PARAM_NAMES[i])))?
            };
            values.push(value);
        }

        Ok(CandidateMigration {
            tx_hash: log.tx_hash.clone(),
            source_contract: log.address.clone(),
            caller: as_address(&values[0], PARAM_NAMES[0])?,
            destination: as_address(&values[1], PARAM_NAMES[1])?,
            raw_amount: as_uint(&values[2], PARAM_NAMES[2])?,
            block_number: log.block_number_u64()?,
            log_index: log.log_index_u32()?,
        })
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, MigratorError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| MigratorError::Decode(format!("invalid hex: {e}")))
}

/// Indexed value types are stored ABI-encoded in a single 32-byte word.
fn decode_topic(topic: &str, ty: &DynSolType) -> Result<DynSolValue, MigratorError> {
    let bytes = decode_hex(topic)?;
    ty.abi_decode(&bytes)
        .map_err(|e| MigratorError::Decode(format!("topic decode: {e}")))
}

fn decode_data(data: &str, types: Vec<DynSolType>) -> Result<Vec<DynSolValue>, MigratorError> {
    if types.is_empty() {
        return Ok(vec![]);
    }
    let bytes = decode_hex(data)?;
    match DynSolType::Tuple(types).abi_decode(&bytes) {
        Ok(DynSolValue::Tuple(values)) => Ok(values),
        Ok(other) => Ok(vec![other]),
        Err(e) => Err(MigratorError::Decode(format!("data decode: {e}"))),
    }
}

fn as_address(value: &DynSolValue, name: &str) -> Result<String, MigratorError> {
    match value {
        DynSolValue::Address(addr) => Ok(addr.to_checksum(None)),
        other => Err(MigratorError::Decode(format!("{name}: expected address, got {other:?}"))),
    }
}

fn as_uint(value: &DynSolValue, name: &str) -> Result<U256, MigratorError> {
    match value {
        DynSolValue::Uint(v, _) => Ok(*v),
        other => Err(MigratorError::Decode(format!("{name}: expected uint, got {other:?}"))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const CALLER: &str = "0x1111111111111111111111111111111111111111";
    pub(crate) const DEST: &str = "0x2222222222222222222222222222222222222222";

    pub(crate) fn word(addr: &str) -> String {
        format!("0x{:0>64}", addr.trim_start_matches("0x"))
    }

    pub(crate) fn migration_log(tx: &str, block: u64, amount: u64) -> RawLog {
        RawLog {
            address: "0x3333333333333333333333333333333333333333".into(),
            topics: vec![
                event_topic0("MigrationRegistered(address,address,uint256)"),
                word(CALLER),
                word(DEST),
            ],
            data: format!("0x{amount:064x}"),
            block_number: format!("0x{block:x}"),
            tx_hash: tx.into(),
            log_index: "0x0".into(),
            removed: None,
        }
    }

    #[test]
    fn topic0_of_known_signature() {
        assert_eq!(
            event_topic0("Transfer(address,address,uint256)"),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn decodes_default_layout() {
        let decoder = MigrationEventDecoder::new(&EventLayout::default()).unwrap();
        let log = migration_log("0xabc", 0x10, 1_500_000_000_000_000_000);
        let c = decoder.decode(&log).unwrap();
        assert_eq!(c.tx_hash, "0xabc");
        assert_eq!(c.caller, CALLER);
        assert_eq!(c.destination, DEST);
        assert_eq!(c.raw_amount, U256::from(1_500_000_000_000_000_000u64));
        assert_eq!(c.block_number, 16);
        assert_eq!(c.source_contract, "0x3333333333333333333333333333333333333333");
    }

    #[test]
    fn decodes_unindexed_layout() {
        let layout = EventLayout {
            indexed: vec![false, false, false],
            ..Default::default()
        };
        let decoder = MigrationEventDecoder::new(&layout).unwrap();
        let mut log = migration_log("0xabc", 1, 7);
        log.topics.truncate(1);
        log.data = format!(
            "0x{}{}{:064x}",
            word(CALLER).trim_start_matches("0x"),
            word(DEST).trim_start_matches("0x"),
            7u64
        );
        let c = decoder.decode(&log).unwrap();
        assert_eq!(c.destination, DEST);
        assert_eq!(c.raw_amount, U256::from(7u64));
    }

    #[test]
    fn rejects_foreign_topic0() {
        let decoder = MigrationEventDecoder::new(&EventLayout::default()).unwrap();
        let mut log = migration_log("0xabc", 1, 7);
        log.topics[0] = event_topic0("Transfer(address,address,uint256)");
        assert!(matches!(decoder.decode(&log), Err(MigratorError::Decode(_))));
    }

    #[test]
    fn rejects_wrong_topic_count() {
        let decoder = MigrationEventDecoder::new(&EventLayout::default()).unwrap();
        let mut log = migration_log("0xabc", 1, 7);
        log.topics.pop();
        assert!(decoder.decode(&log).is_err());
    }

    #[test]
    fn layout_needs_three_flags() {
        let layout = EventLayout {
            indexed: vec![true],
            ..Default::default()
        };
        assert!(MigrationEventDecoder::new(&layout).is_err());
    }
}
