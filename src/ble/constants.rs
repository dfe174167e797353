//! Constants for the Aivo BLE layer: GATT identifiers of the provisioning
//! surface and wire-framing sizes.

use uuid::Uuid;

/// Advertised name prefix of Aivo pods.
pub const POD_NAME_PREFIX: &str = "Aivo";

/// The Aivo provisioning service.
pub const UUID_PROVISIONING_SERVICE: Uuid =
    Uuid::from_u128(0x4169766f_0001_4c50_8276_6e21a5d3c401);

/// Provisioning write characteristic (companion → pod commands).
pub const UUID_PROVISIONING_WRITE_CHAR: Uuid =
    Uuid::from_u128(0x4169766f_0002_4c50_8276_6e21a5d3c401);

/// Provisioning notify characteristic (pod → companion responses and status
/// pushes).
pub const UUID_PROVISIONING_NOTIFY_CHAR: Uuid =
    Uuid::from_u128(0x4169766f_0003_4c50_8276_6e21a5d3c401);

/// Chunk header: one flags byte plus a big-endian ordinal.
pub const CHUNK_HEADER_LEN: usize = 3;

/// Smallest MTU the chunker accepts: header plus one payload byte.
pub const MIN_CHUNK_MTU: u16 = (CHUNK_HEADER_LEN + 1) as u16;

/// Largest message the reassembly buffer will accumulate before declaring
/// the peer broken.
pub const MAX_REASSEMBLY_LEN: usize = 64 * 1024;
