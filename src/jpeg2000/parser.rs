//! Codestream parsing (ISO/IEC 15444-1 Annex A): main header (SOC, SIZ, COD,
//! QCD, CAP, COM) and tile-part headers (SOT ... SOD).

use super::image::{
    J2kCap, J2kCod, J2kComment, J2kComponentInfo, J2kImage, J2kQcd, J2kRoi,
};
use super::marker::J2kMarkerCode;
use super::reader::J2kStreamReader;
use crate::error::J2kError;

pub struct J2kParser<'a, 'b> {
    pub reader: &'b mut J2kStreamReader<'a>,
    pub image: Box<J2kImage>,
}

impl<'a, 'b> J2kParser<'a, 'b> {
    pub fn new(reader: &'b mut J2kStreamReader<'a>) -> Self {
        Self {
            reader,
            image: Box::new(J2kImage::default()),
        }
    }

    pub fn parse_main_header(&mut self) -> Result<J2kMarkerCode, J2kError> {
        let soc = self.reader.read_u16()?;
        if soc != J2kMarkerCode::StartOfCodestream as u16 {
            return Err(J2kError::MalformedStream("expected SOC marker".into()));
        }

        loop {
            let marker = self.read_marker()?;
            match marker {
                J2kMarkerCode::ImageAndTileSize => self.parse_siz()?,
                J2kMarkerCode::CodingStyleDefault => self.parse_cod()?,
                J2kMarkerCode::QuantizationDefault => self.parse_qcd()?,
                J2kMarkerCode::Capability => self.parse_cap()?,
                J2kMarkerCode::RegionOfInterest => self.parse_rgn()?,
                J2kMarkerCode::Comment => self.parse_com()?,
                J2kMarkerCode::StartOfTile => return Ok(J2kMarkerCode::StartOfTile),
                other => {
                    self.skip_segment()?;
                    let _ = other;
                }
            }
        }
    }

    fn read_marker(&mut self) -> Result<J2kMarkerCode, J2kError> {
        let b1 = self.reader.read_u8()?;
        if b1 != 0xFF {
            return Err(J2kError::MalformedStream(format!(
                "expected marker start byte, got {b1:#04x}"
            )));
        }
        let b2 = self.reader.read_u8()?;
        J2kMarkerCode::try_from(0xFF00u16 | b2 as u16)
            .map_err(|_| J2kError::UnsupportedFeature(format!("unknown marker 0xFF{b2:02X}")))
    }

    fn skip_segment(&mut self) -> Result<(), J2kError> {
        let len = self.reader.read_u16()?;
        if len < 2 {
            return Err(J2kError::MalformedStream("marker segment too short".into()));
        }
        self.reader.advance((len - 2) as usize);
        Ok(())
    }

    pub fn parse_siz(&mut self) -> Result<(), J2kError> {
        let _len = self.reader.read_u16()?;
        let _rsiz = self.reader.read_u16()?;
        self.image.width = self.reader.read_u32()?;
        self.image.height = self.reader.read_u32()?;
        self.image.x_origin = self.reader.read_u32()?;
        self.image.y_origin = self.reader.read_u32()?;

        self.image.tile_width = self.reader.read_u32()?;
        self.image.tile_height = self.reader.read_u32()?;
        self.image.tile_x_origin = self.reader.read_u32()?;
        self.image.tile_y_origin = self.reader.read_u32()?;

        let comps = self.reader.read_u16()?;
        self.image.component_count = comps as u32;

        for _ in 0..comps {
            let depth_byte = self.reader.read_u8()?;
            let depth = (depth_byte & 0x7F) + 1;
            let is_signed = (depth_byte & 0x80) != 0;
            let dx = self.reader.read_u8()?;
            let dy = self.reader.read_u8()?;
            self.image.components.push(J2kComponentInfo {
                depth,
                is_signed,
                dx,
                dy,
            });
        }
        Ok(())
    }

    pub fn parse_cod(&mut self) -> Result<(), J2kError> {
        let len = self.reader.read_u16()?;
        if len < 12 {
            return Err(J2kError::MalformedStream("COD segment too short".into()));
        }
        let scod = self.reader.read_u8()?;
        let sprog = self.reader.read_u8()?;
        let nlayers = self.reader.read_u16()?;
        let mct = self.reader.read_u8()?;
        let decomposition_levels = self.reader.read_u8()?;
        let codeblock_width_exp = self.reader.read_u8()?;
        let codeblock_height_exp = self.reader.read_u8()?;
        let codeblock_style = self.reader.read_u8()?;
        let transformation = self.reader.read_u8()?;

        let mut precinct_sizes = Vec::new();
        if (scod & J2kCod::EXPLICIT_PRECINCTS) != 0 {
            let count = (decomposition_levels + 1) as usize;
            for _ in 0..count {
                let b = self.reader.read_u8()?;
                precinct_sizes.push((b & 0x0F, (b >> 4) & 0x0F));
            }
        }

        let parsed_bytes = 12 + precinct_sizes.len();
        let remaining = (len as usize).saturating_sub(parsed_bytes);
        if remaining > 0 {
            self.reader.advance(remaining);
        }
        self.image.cod = Some(J2kCod {
            coding_style: scod,
            progression_order: sprog,
            number_of_layers: nlayers,
            mct,
            decomposition_levels,
            codeblock_width_exp,
            codeblock_height_exp,
            codeblock_style,
            transformation,
            precinct_sizes,
        });
        Ok(())
    }

    pub fn parse_qcd(&mut self) -> Result<(), J2kError> {
        let len = self.reader.read_u16()?;
        if len < 3 {
            return Err(J2kError::MalformedStream("QCD segment too short".into()));
        }
        let sqcd = self.reader.read_u8()?;
        let guard_bits = sqcd >> 5;
        let quant_type = sqcd & 0x1F;
        let is_expounded = quant_type == 0x02;
        let step_size_len = if is_expounded { 2 } else { 1 };

        let mut bytes_left = (len as usize).saturating_sub(3);
        let mut step_sizes = Vec::new();
        while bytes_left >= step_size_len {
            let raw = if is_expounded {
                self.reader.read_u16()?
            } else {
                (self.reader.read_u8()? as u16) << 3
            };
            let exponent = (raw >> 11) as u8;
            let mantissa = raw & 0x7FF;
            step_sizes.push((exponent, mantissa));
            bytes_left -= step_size_len;
        }
        if bytes_left > 0 {
            self.reader.advance(bytes_left);
        }
        self.image.qcd = Some(J2kQcd {
            quant_style: sqcd,
            guard_bits,
            step_sizes,
        });
        Ok(())
    }

    pub fn parse_cap(&mut self) -> Result<(), J2kError> {
        let len = self.reader.read_u16()?;
        if len < 6 {
            return Err(J2kError::MalformedStream("CAP segment too short".into()));
        }
        let pcap = self.reader.read_u32()?;
        let mut bytes_left = (len as usize).saturating_sub(6);
        let mut ccap = Vec::new();
        while bytes_left >= 2 {
            ccap.push(self.reader.read_u16()?);
            bytes_left -= 2;
        }
        if bytes_left > 0 {
            self.reader.advance(bytes_left);
        }
        self.image.cap = Some(J2kCap { pcap, ccap });
        Ok(())
    }

    pub fn parse_rgn(&mut self) -> Result<(), J2kError> {
        let len = self.reader.read_u16()?;
        if len < 5 {
            return Err(J2kError::MalformedStream("RGN segment too short".into()));
        }
        let component_index = self.reader.read_u8()? as u16;
        let roi_style = self.reader.read_u8()?;
        let shift_value = self.reader.read_u8()?;
        let remaining = (len as usize).saturating_sub(5);
        if remaining > 0 {
            self.reader.advance(remaining);
        }
        self.image.roi = Some(J2kRoi {
            component_index,
            roi_style,
            shift_value,
        });
        Ok(())
    }

    pub fn parse_com(&mut self) -> Result<(), J2kError> {
        let len = self.reader.read_u16()?;
        if len < 4 {
            return Err(J2kError::MalformedStream("COM segment too short".into()));
        }
        let registration = self.reader.read_u16()?;
        let data = self.reader.read_bytes(len as usize - 4)?.to_vec();
        self.image.com.push(J2kComment { registration, data });
        Ok(())
    }

    /// Parses an SOT ... SOD tile-part header, returning `(psot, isot)`.
    pub fn parse_tile_part_header(&mut self) -> Result<(u32, u16), J2kError> {
        let _lsot = self.reader.read_u16()?;
        let isot = self.reader.read_u16()?;
        let psot = self.reader.read_u32()?;
        let _tpsot = self.reader.read_u8()?;
        let _tnsot = self.reader.read_u8()?;

        loop {
            if self.reader.remaining_data().len() < 2 {
                return Err(J2kError::Truncated("tile-part header never reached SOD".into()));
            }
            let b1 = self.reader.read_u8()?;
            if b1 != 0xFF {
                return Err(J2kError::MalformedStream("expected marker in tile-part header".into()));
            }
            let b2 = self.reader.read_u8()?;
            if b2 == (J2kMarkerCode::StartOfData as u16 & 0xFF) as u8 {
                break;
            }
            match J2kMarkerCode::try_from(0xFF00u16 | b2 as u16) {
                Ok(J2kMarkerCode::CodingStyleDefault) => self.parse_cod()?,
                Ok(J2kMarkerCode::QuantizationDefault) => self.parse_qcd()?,
                _ => self.skip_segment()?,
            }
        }

        Ok((psot, isot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn siz_bytes() -> Vec<u8> {
        vec![
            0xFF, 0x4F, // SOC
            0xFF, 0x51, // SIZ
            0x00, 0x29, // Len = 41
            0x00, 0x00, // Rsiz
            0x00, 0x00, 0x01, 0x00, // width 256
            0x00, 0x00, 0x01, 0x00, // height 256
            0x00, 0x00, 0x00, 0x00, // x0
            0x00, 0x00, 0x00, 0x00, // y0
            0x00, 0x00, 0x01, 0x00, // tile width
            0x00, 0x00, 0x01, 0x00, // tile height
            0x00, 0x00, 0x00, 0x00, // tile x0
            0x00, 0x00, 0x00, 0x00, // tile y0
            0x00, 0x01, // 1 component
            0x07, 0x01, 0x01, // 8-bit unsigned, 1x1
            0xFF, 0x90, // SOT (ends main header)
            0x00, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]
    }

    #[test]
    fn parses_siz() {
        let data = siz_bytes();
        let mut reader = J2kStreamReader::new(&data);
        let mut parser = J2kParser::new(&mut reader);
        parser.parse_main_header().unwrap();
        assert_eq!(parser.image.width, 256);
        assert_eq!(parser.image.height, 256);
        assert_eq!(parser.image.component_count, 1);
    }

    #[test]
    fn parses_cod_and_qcd() {
        let mut data = vec![
            0xFF, 0x4F, // SOC
            0xFF, 0x51, 0x00, 0x29, 0x00, 0x00, // SIZ..Rsiz
            0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x07, 0x01, 0x01,
        ];
        data.extend_from_slice(&[
            0xFF, 0x52, // COD
            0x00, 0x0C, // len=12
            0x00, // scod
            0x02, // progression order
            0x00, 0x01, // layers
            0x00, // mct
            0x03, // levels
            0x04, // cb width exp
            0x05, // cb height exp
            0x00, // style
            0x00, // transform
        ]);
        data.extend_from_slice(&[
            0xFF, 0x5C, // QCD
            0x00, 0x04, 0x06, 0x10,
        ]);
        data.extend_from_slice(&[0xFF, 0x90, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

        let mut reader = J2kStreamReader::new(&data);
        let mut parser = J2kParser::new(&mut reader);
        parser.parse_main_header().unwrap();
        let cod = parser.image.cod.as_ref().unwrap();
        assert_eq!(cod.progression_order, 2);
        assert_eq!(cod.number_of_layers, 1);
        let qcd = parser.image.qcd.as_ref().unwrap();
        assert_eq!(qcd.quant_style, 0x06);
        assert_eq!(qcd.step_sizes, vec![(2, 0)]);
    }

    #[test]
    fn rejects_bad_soc() {
        let data = vec![0x00, 0x00];
        let mut reader = J2kStreamReader::new(&data);
        let mut parser = J2kParser::new(&mut reader);
        assert!(parser.parse_main_header().is_err());
    }
}
