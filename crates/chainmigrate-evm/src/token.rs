//! Source token precision discovery.
//!
//! Each migration contract exposes the token it accepts via `token()`; the
//! token reports its precision via ERC-20 `decimals()`. Every monitored
//! contract must point at tokens of the same precision.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::keccak256;

use chainmigrate_core::chain::ChainRpc;
use chainmigrate_core::error::MigratorError;

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Address of the token a migration contract accepts.
pub async fn migration_token(chain: &dyn ChainRpc, contract: &str) -> Result<String, MigratorError> {
    let ret = chain.call(contract, &selector("token()")).await?;
    match DynSolType::Address.abi_decode(&ret) {
        Ok(DynSolValue::Address(addr)) => Ok(addr.to_checksum(None)),
        Ok(other) => Err(MigratorError::Decode(format!("token(): unexpected value {other:?}"))),
        Err(e) => Err(MigratorError::Decode(format!("token() on {contract}: {e}"))),
    }
}

/// ERC-20 `decimals()` of `token`.
pub async fn erc20_decimals(chain: &dyn ChainRpc, token: &str) -> Result<u8, MigratorError> {
    let ret = chain.call(token, &selector("decimals()")).await?;
    match DynSolType::Uint(8).abi_decode(&ret) {
        Ok(DynSolValue::Uint(v, _)) => u8::try_from(v)
            .map_err(|_| MigratorError::Decode(format!("decimals() on {token} out of range: {v}"))),
        Ok(other) => Err(MigratorError::Decode(format!("decimals(): unexpected value {other:?}"))),
        Err(e) => Err(MigratorError::Decode(format!("decimals() on {token}: {e}"))),
    }
}

/// Precision shared by the tokens behind every contract in `contracts`.
pub async fn discover_source_decimals(
    chain: &dyn ChainRpc,
    contracts: &[String],
) -> Result<u8, MigratorError> {
    let mut agreed: Option<(u8, &str)> = None;
    for contract in contracts {
        let token = migration_token(chain, contract).await?;
        let decimals = erc20_decimals(chain, &token).await?;
        tracing::debug!(contract = %contract, token = %token, decimals, "source token precision");
        match agreed {
            None => agreed = Some((decimals, contract.as_str())),
            Some((first, first_contract)) if first != decimals => {
                return Err(MigratorError::Config(format!(
                    "migration contracts disagree on token decimals: {first_contract} has {first}, {contract} has {decimals}"
                )));
            }
            Some(_) => {}
        }
    }
    agreed
        .map(|(decimals, _)| decimals)
        .ok_or_else(|| MigratorError::Config("no migration contracts to read decimals from".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chainmigrate_core::chain::{LogFilter, RawLog};

    /// Answers `token()` per contract and `decimals()` per token.
    struct TokenChain {
        tokens: HashMap<String, String>,
        decimals: HashMap<String, u8>,
    }

    fn word_hex(hex_body: &str) -> Vec<u8> {
        hex::decode(format!("{hex_body:0>64}")).unwrap()
    }

    #[async_trait]
    impl ChainRpc for TokenChain {
        async fn current_height(&self) -> Result<u64, MigratorError> {
            Ok(0)
        }

        async fn event_logs(
            &self,
            _contract: &str,
            _from: u64,
            _to: u64,
            _filter: &LogFilter,
        ) -> Result<Vec<RawLog>, MigratorError> {
            Ok(vec![])
        }

        async fn call(&self, to: &str, calldata: &[u8]) -> Result<Vec<u8>, MigratorError> {
            if calldata == selector("token()") {
                let token = self.tokens.get(to).ok_or_else(|| MigratorError::Rpc("revert".into()))?;
                Ok(word_hex(token.trim_start_matches("0x")))
            } else if calldata == selector("decimals()") {
                let d = self.decimals.get(to).ok_or_else(|| MigratorError::Rpc("revert".into()))?;
                Ok(word_hex(&format!("{d:x}")))
            } else {
                Err(MigratorError::Rpc("unknown selector".into()))
            }
        }
    }

    const TOKEN_A: &str = "0x4444444444444444444444444444444444444444";
    const TOKEN_B: &str = "0x5555555555555555555555555555555555555555";

    fn chain(b_decimals: u8) -> TokenChain {
        TokenChain {
            tokens: HashMap::from([
                ("0xc1".to_string(), TOKEN_A.to_string()),
                ("0xc2".to_string(), TOKEN_B.to_string()),
            ]),
            decimals: HashMap::from([(TOKEN_A.to_string(), 18), (TOKEN_B.to_string(), b_decimals)]),
        }
    }

    #[test]
    fn selectors() {
        assert_eq!(hex::encode(selector("decimals()")), "313ce567");
        assert_eq!(hex::encode(selector("token()")), "fc0c546a");
    }

    #[tokio::test]
    async fn agreeing_contracts() {
        let contracts = vec!["0xc1".to_string(), "0xc2".to_string()];
        assert_eq!(discover_source_decimals(&chain(18), &contracts).await.unwrap(), 18);
    }

    #[tokio::test]
    async fn disagreeing_contracts_are_a_config_error() {
        let contracts = vec!["0xc1".to_string(), "0xc2".to_string()];
        assert!(matches!(
            discover_source_decimals(&chain(6), &contracts).await,
            Err(MigratorError::Config(_))
        ));
    }

    #[tokio::test]
    async fn no_contracts() {
        assert!(discover_source_decimals(&chain(18), &[]).await.is_err());
    }
}
