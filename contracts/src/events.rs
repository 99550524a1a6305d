//! # Bank Events
//!
//! The externally observable record of what the bank did. An event is
//! appended only after the operation it describes has fully settled, so a
//! rolled-back deposit never shows up here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vaultline_protocol::{AccountId, AssetId, U256};

/// Something that happened to the bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BankEvent {
    /// A deposit settled.
    Deposit {
        /// Depositor.
        account: AccountId,
        /// Asset deposited.
        asset: AssetId,
        /// Amount pulled in, native units.
        raw_amount: U256,
        /// Amount credited, ledger units.
        ledger_amount: U256,
    },
    /// A withdrawal settled.
    Withdrawal {
        /// Recipient.
        account: AccountId,
        /// Asset withdrawn.
        asset: AssetId,
        /// Amount pushed out, native units.
        raw_amount: U256,
        /// Amount debited, ledger units.
        ledger_amount: U256,
    },
    /// The value feed was replaced.
    FeedUpdated {
        /// Description of the new feed.
        feed: String,
    },
    /// An asset became eligible for deposit.
    AssetRegistered {
        /// The asset.
        asset: AssetId,
    },
    /// An asset stopped being eligible for deposit.
    AssetDeregistered {
        /// The asset.
        asset: AssetId,
    },
    /// An admin replaced an asset's cached precision.
    PrecisionOverridden {
        /// The asset.
        asset: AssetId,
        /// New native precision.
        decimals: u8,
    },
}

/// A [`BankEvent`] with its position in the log and a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Zero-based position in the event log.
    pub sequence: u64,
    /// When the event was appended.
    pub recorded_at: DateTime<Utc>,
    /// The event.
    #[serde(flatten)]
    pub event: BankEvent,
}

impl BankEvent {
    /// Short name, used for log lines and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            BankEvent::Deposit { .. } => "deposit",
            BankEvent::Withdrawal { .. } => "withdrawal",
            BankEvent::FeedUpdated { .. } => "feed_updated",
            BankEvent::AssetRegistered { .. } => "asset_registered",
            BankEvent::AssetDeregistered { .. } => "asset_deregistered",
            BankEvent::PrecisionOverridden { .. } => "precision_overridden",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let record = EventRecord {
            sequence: 3,
            recorded_at: Utc::now(),
            event: BankEvent::AssetRegistered {
                asset: AssetId::from_low_u8(1),
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "asset_registered");
        assert_eq!(json["sequence"], 3);
        assert_eq!(json["asset"], "0x0000000000000000000000000000000000000001");
    }

    #[test]
    fn names_match_serde_tags() {
        let event = BankEvent::FeedUpdated { feed: "BASE / USD".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
    }
}
