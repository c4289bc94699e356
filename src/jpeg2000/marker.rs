//! JPEG 2000 codestream marker codes (ISO/IEC 15444-1 Annex A, plus the
//! Part 15 CAP marker).

use num_enum::TryFromPrimitive;

pub const MARKER_START_BYTE: u8 = 0xFF;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum J2kMarkerCode {
    StartOfCodestream = 0xFF4F,
    StartOfTile = 0xFF90,
    StartOfData = 0xFF93,
    EndOfCodestream = 0xFFD9,
    ImageAndTileSize = 0xFF51,
    CodingStyleDefault = 0xFF52,
    CodingStyleComponent = 0xFF53,
    QuantizationDefault = 0xFF5C,
    QuantizationComponent = 0xFF5D,
    RegionOfInterest = 0xFF5E,
    ProgressionOrderDefault = 0xFF5F,
    PackedPacketHeadersMainHeader = 0xFF60,
    PackedPacketHeadersTilePart = 0xFF61,
    PacketLengthMainHeader = 0xFF55,
    PacketLengthTilePart = 0xFF57,
    Comment = 0xFF64,
    Capability = 0xFF50,
    MultipleComponentTransform = 0xFF74,
    MultipleComponentTransformCollection = 0xFF75,
    MultipleComponentTransformOrdering = 0xFF76,
}

impl J2kMarkerCode {
    /// True for markers that are followed by an `Lxxx` length field.
    pub fn has_length_field(self) -> bool {
        !matches!(
            self,
            J2kMarkerCode::StartOfCodestream
                | J2kMarkerCode::StartOfData
                | J2kMarkerCode::EndOfCodestream
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u16() {
        let code = J2kMarkerCode::StartOfCodestream;
        let raw = code as u16;
        assert_eq!(raw, 0xFF4F);
        assert_eq!(J2kMarkerCode::try_from(raw).unwrap(), code);
    }

    #[test]
    fn framing_markers_have_no_length() {
        assert!(!J2kMarkerCode::StartOfCodestream.has_length_field());
        assert!(J2kMarkerCode::ImageAndTileSize.has_length_field());
    }
}
