use crate::consts::{DRAM_SIZE, IMAGE_HEADER_LEN};
use crate::error::ImageError;

/// A parsed program image: where execution starts, where interrupts are
/// vectored, and the code/data bytes to load into DRAM at address 0.
///
/// The header is two little-endian `u64` addresses followed by the raw
/// memory image. Both fields are stored as full words even though the
/// VM's address space only spans the low 32 bits, to keep the header
/// aligned with the VM's native `Word` size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub entry: u32,
    pub interrupt_handler: u32,
    pub code: Vec<u8>,
}

impl Image {
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < IMAGE_HEADER_LEN {
            return Err(ImageError::TooShort(bytes.len(), IMAGE_HEADER_LEN));
        }
        let entry = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let interrupt_handler = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        let code = bytes[IMAGE_HEADER_LEN..].to_vec();
        if code.len() as u64 > DRAM_SIZE {
            return Err(ImageError::TooLarge(code.len(), DRAM_SIZE));
        }
        Ok(Self {
            entry: entry as u32,
            interrupt_handler: interrupt_handler as u32,
            code,
        })
    }

    /// Serialize back to the on-disk header + code layout, for the
    /// compiler's binary emitter and for round-trip tests.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(IMAGE_HEADER_LEN + self.code.len());
        bytes.extend((self.entry as u64).to_le_bytes());
        bytes.extend((self.interrupt_handler as u64).to_le_bytes());
        bytes.extend(&self.code);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(entry: u64, interrupt: u64) -> Vec<u8> {
        let mut bytes = entry.to_le_bytes().to_vec();
        bytes.extend(interrupt.to_le_bytes());
        bytes
    }

    #[test]
    fn parses_header_and_code() {
        let mut bytes = header(0x100, 0x400);
        bytes.extend([0xaa, 0xbb, 0xcc]);
        let image = Image::parse(&bytes).unwrap();
        assert_eq!(image.entry, 0x100);
        assert_eq!(image.interrupt_handler, 0x400);
        assert_eq!(image.code, vec![0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn rejects_images_shorter_than_the_header() {
        assert!(matches!(
            Image::parse(&[0, 1, 2]),
            Err(ImageError::TooShort(3, IMAGE_HEADER_LEN))
        ));
    }

    #[test]
    fn rejects_code_that_overflows_dram() {
        let mut bytes = header(0, 0);
        bytes.resize(IMAGE_HEADER_LEN + DRAM_SIZE as usize + 1, 0);
        assert!(matches!(Image::parse(&bytes), Err(ImageError::TooLarge(_, _))));
    }

    #[test]
    fn to_bytes_round_trips_through_parse() {
        let image = Image { entry: 0x100, interrupt_handler: 0x400, code: vec![1, 2, 3, 4] };
        assert_eq!(Image::parse(&image.to_bytes()).unwrap(), image);
    }
}
