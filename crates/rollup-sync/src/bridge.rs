//! Bridge call descriptors and interaction results

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};

/// Bridge call slots available in one rollup block.
pub const NUM_BRIDGE_CALLS_PER_BLOCK: u64 = 32;

/// Asset ids at or above this flag denote virtual assets; the low bits carry
/// the interaction nonce that minted them.
pub const VIRTUAL_ASSET_ID_FLAG: u32 = 1 << 29;

/// Output asset id placeholder meaning "virtual asset of this interaction".
pub const VIRTUAL_ASSET_ID_PLACEHOLDER: u32 = (1 << 30) - 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeCallData {
    pub bridge_address_id: u32,
    pub input_asset_id_a: u32,
    pub output_asset_id_a: u32,
    pub input_asset_id_b: Option<u32>,
    pub output_asset_id_b: Option<u32>,
    pub aux_data: u64,
}

impl BridgeCallData {
    pub fn new(bridge_address_id: u32, input_asset_id_a: u32, output_asset_id_a: u32) -> Self {
        Self {
            bridge_address_id,
            input_asset_id_a,
            output_asset_id_a,
            input_asset_id_b: None,
            output_asset_id_b: None,
            aux_data: 0,
        }
    }

    pub fn with_input_b(mut self, asset_id: u32) -> Self {
        self.input_asset_id_b = Some(asset_id);
        self
    }

    pub fn with_output_b(mut self, asset_id: u32) -> Self {
        self.output_asset_id_b = Some(asset_id);
        self
    }

    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        Self {
            bridge_address_id: rng.next_u32() % 1024,
            input_asset_id_a: rng.next_u32() % 64,
            output_asset_id_a: rng.next_u32() % 64,
            input_asset_id_b: None,
            output_asset_id_b: None,
            aux_data: rng.next_u64(),
        }
    }

    /// Stable 32-byte encoding used inside tx ids and commitments.
    pub fn to_field(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[0..4].copy_from_slice(&self.bridge_address_id.to_be_bytes());
        out[4..8].copy_from_slice(&self.input_asset_id_a.to_be_bytes());
        out[8..12].copy_from_slice(&self.output_asset_id_a.to_be_bytes());
        out[12..16].copy_from_slice(&self.input_asset_id_b.map_or(u32::MAX, |a| a).to_be_bytes());
        out[16..20].copy_from_slice(&self.output_asset_id_b.map_or(u32::MAX, |a| a).to_be_bytes());
        out[24..32].copy_from_slice(&self.aux_data.to_be_bytes());
        out
    }
}

/// Resolve an output asset id for notes minted by `interaction_nonce`.
///
/// `None` when the nonce does not fit below the virtual asset flag's range.
pub fn resolve_output_asset_id(asset_id: u32, interaction_nonce: u64) -> Option<u32> {
    if asset_id != VIRTUAL_ASSET_ID_PLACEHOLDER {
        return Some(asset_id);
    }
    let nonce = u32::try_from(interaction_nonce).ok()?;
    if nonce >= VIRTUAL_ASSET_ID_FLAG {
        return None;
    }
    VIRTUAL_ASSET_ID_FLAG.checked_add(nonce)
}

/// Bridge interaction outcome published in a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefiInteractionEvent {
    pub bridge_call_data: BridgeCallData,
    pub interaction_nonce: u64,
    pub total_input_value: u128,
    pub total_output_value_a: u128,
    pub total_output_value_b: u128,
    pub success: bool,
}

impl DefiInteractionEvent {
    /// Pro-rata share of the interaction outputs for one deposit.
    ///
    /// The product is taken at full width; `None` when a share does not fit
    /// in `u128`, which only happens when the deposit exceeds the total input.
    pub fn output_values_for(&self, deposit_value: u128) -> Option<(u128, u128)> {
        if self.total_input_value == 0 {
            return Some((0, 0));
        }
        let share = |total_output: u128| {
            (BigUint::from(total_output) * BigUint::from(deposit_value) / BigUint::from(self.total_input_value))
                .to_u128()
        };
        Some((share(self.total_output_value_a)?, share(self.total_output_value_b)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_values_are_pro_rata() {
        let event = DefiInteractionEvent {
            bridge_call_data: BridgeCallData::new(0, 1, 2),
            interaction_nonce: 0,
            total_input_value: 320,
            total_output_value_a: 64,
            total_output_value_b: 640,
            success: true,
        };
        assert_eq!(event.output_values_for(64), Some((12, 128)));
    }

    #[test]
    fn output_values_handle_token_scale_amounts() {
        let e24 = 10u128.pow(24);
        let event = DefiInteractionEvent {
            bridge_call_data: BridgeCallData::new(0, 1, 2),
            interaction_nonce: 0,
            total_input_value: 2 * e24,
            total_output_value_a: 3 * e24,
            total_output_value_b: u128::MAX,
            success: true,
        };
        assert_eq!(event.output_values_for(e24), Some((3 * e24 / 2, u128::MAX / 2)));
        assert_eq!(event.output_values_for(2 * e24), Some((3 * e24, u128::MAX)));
    }

    #[test]
    fn share_above_u128_is_rejected() {
        let event = DefiInteractionEvent {
            bridge_call_data: BridgeCallData::new(0, 1, 2),
            interaction_nonce: 0,
            total_input_value: 1,
            total_output_value_a: u128::MAX,
            total_output_value_b: 0,
            success: true,
        };
        assert_eq!(event.output_values_for(2), None);
    }

    #[test]
    fn empty_interaction_yields_nothing() {
        let event = DefiInteractionEvent {
            bridge_call_data: BridgeCallData::new(0, 1, 2),
            interaction_nonce: 3,
            total_input_value: 0,
            total_output_value_a: 10,
            total_output_value_b: 0,
            success: false,
        };
        assert_eq!(event.output_values_for(5), Some((0, 0)));
    }

    #[test]
    fn placeholder_resolves_to_virtual_asset() {
        assert_eq!(resolve_output_asset_id(VIRTUAL_ASSET_ID_PLACEHOLDER, 789), Some(VIRTUAL_ASSET_ID_FLAG + 789));
        assert_eq!(resolve_output_asset_id(3, 789), Some(3));
    }

    #[test]
    fn out_of_range_nonce_has_no_virtual_asset() {
        let placeholder = VIRTUAL_ASSET_ID_PLACEHOLDER;
        assert_eq!(resolve_output_asset_id(placeholder, u64::from(u32::MAX) + 1), None);
        assert_eq!(resolve_output_asset_id(placeholder, u64::from(VIRTUAL_ASSET_ID_FLAG)), None);
        assert_eq!(resolve_output_asset_id(placeholder, u64::from(VIRTUAL_ASSET_ID_FLAG - 1)), Some(VIRTUAL_ASSET_ID_FLAG * 2 - 1));
        // Real asset ids never depend on the nonce.
        assert_eq!(resolve_output_asset_id(3, u64::MAX), Some(3));
    }
}
