//! 계좌 스냅샷.
//!
//! 스냅샷은 불변 값으로, 캐시에서 항상 통째로 교체되며 제자리에서
//! 수정되지 않습니다. 읽기 실패 시 호출자는 전량 0인 기본 스냅샷을
//! 받아 "준비되지 않음"으로 처리해야 합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 자산별 하위 잔고.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetBalance {
    /// 자산 이름 (예: "USDT", "BNB")
    pub asset: String,
    /// 지갑 잔고
    pub wallet_balance: Decimal,
    /// 사용 가능한 잔고
    pub available_balance: Decimal,
}

/// 선물 계좌 스냅샷.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// 총 지갑 잔고
    pub wallet_balance: Decimal,
    /// 마진 잔고 (지갑 잔고 + 미실현 손익)
    pub margin_balance: Decimal,
    /// 주문에 사용 가능한 잔고
    pub available_balance: Decimal,
    /// 자산별 하위 잔고
    pub assets: Vec<AssetBalance>,
}

impl AccountSnapshot {
    /// 특정 자산의 잔고를 조회합니다.
    pub fn asset(&self, name: &str) -> Option<&AssetBalance> {
        self.assets.iter().find(|a| a.asset.eq_ignore_ascii_case(name))
    }

    /// 스냅샷이 비어 있는지 (읽기 실패 대체값인지) 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.wallet_balance.is_zero() && self.assets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_snapshot_is_empty() {
        let snapshot = AccountSnapshot::default();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.available_balance, Decimal::ZERO);
    }

    #[test]
    fn test_asset_lookup_case_insensitive() {
        let snapshot = AccountSnapshot {
            wallet_balance: dec!(1000),
            margin_balance: dec!(1000),
            available_balance: dec!(900),
            assets: vec![AssetBalance {
                asset: "USDT".to_string(),
                wallet_balance: dec!(1000),
                available_balance: dec!(900),
            }],
        };

        assert!(snapshot.asset("usdt").is_some());
        assert!(snapshot.asset("BNB").is_none());
        assert!(!snapshot.is_empty());
    }
}
