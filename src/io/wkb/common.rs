use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::datatypes::{Dimension, GeometryType};
use crate::error::{GeoArrowError, Result};

const EWKB_Z_FLAG: u32 = 0x8000_0000;
const EWKB_M_FLAG: u32 = 0x4000_0000;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;
const EWKB_FLAGS: u32 = EWKB_Z_FLAG | EWKB_M_FLAG | EWKB_SRID_FLAG;

/// The byte order marker starting every WKB geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Endianness {
    /// XDR
    BigEndian = 0,
    /// NDR
    LittleEndian = 1,
}

/// A decoded WKB geometry type code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WkbType {
    pub geometry_type: GeometryType,
    pub dim: Dimension,
    /// Whether an EWKB SRID follows the type code.
    pub has_srid: bool,
}

impl WkbType {
    pub fn new(geometry_type: GeometryType, dim: Dimension) -> Self {
        Self {
            geometry_type,
            dim,
            has_srid: false,
        }
    }

    /// Decode an ISO (`1001`) or EWKB (`0x80000001`) type code.
    pub fn decode(code: u32) -> Result<Self> {
        let base = code & !EWKB_FLAGS;
        let iso_dim = Dimension::try_from_iso_wkb_block(base / 1000)
            .map_err(|_| GeoArrowError::Wkb(format!("Invalid WKB geometry type code {code}")))?;
        let geometry_type = match GeometryType::try_from(base % 1000) {
            Ok(GeometryType::Geometry) | Err(_) => {
                return Err(GeoArrowError::Wkb(format!(
                    "Unsupported WKB geometry type code {code}"
                )))
            }
            Ok(typ) => typ,
        };
        let dim = Dimension::from_flags(
            iso_dim.has_z() || code & EWKB_Z_FLAG != 0,
            iso_dim.has_m() || code & EWKB_M_FLAG != 0,
        );
        Ok(Self {
            geometry_type,
            dim,
            has_srid: code & EWKB_SRID_FLAG != 0,
        })
    }

    /// The ISO type code.
    pub fn iso_code(&self) -> u32 {
        u32::from(self.geometry_type) + 1000 * self.dim.iso_wkb_block()
    }
}
