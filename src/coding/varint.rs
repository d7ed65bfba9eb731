// QUIC variable-length integers, as defined in RFC 9000.
// The two most significant bits of the first byte encode the length.

use super::{Decode, DecodeError, Encode, EncodeError};

/// The largest value that fits in a varint: 2^62 - 1.
pub const MAX_VARINT: u64 = (1 << 62) - 1;

impl Encode for u64 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		let v = *self;
		if v < (1 << 6) {
			w.put_u8(v as u8);
		} else if v < (1 << 14) {
			w.put_u16(0b01 << 14 | v as u16);
		} else if v < (1 << 30) {
			w.put_u32(0b10 << 30 | v as u32);
		} else if v <= MAX_VARINT {
			w.put_u64(0b11 << 62 | v);
		} else {
			return Err(EncodeError::BoundsExceeded);
		}

		Ok(())
	}
}

impl Decode for u64 {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Self::decode_remaining(buf, 1)?;
		let b = buf.get_u8();

		let size = 1usize << (b >> 6);
		let mut v = (b & 0b0011_1111) as u64;

		Self::decode_remaining(buf, size - 1)?;
		for _ in 1..size {
			v = (v << 8) | buf.get_u8() as u64;
		}

		Ok(v)
	}
}

impl Encode for usize {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		(*self as u64).encode(w)
	}
}

impl Decode for usize {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		let v = u64::decode(buf)?;
		v.try_into().map_err(|_| DecodeError::BoundsExceeded)
	}
}

impl Encode for u8 {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		w.put_u8(*self);
		Ok(())
	}
}

impl Decode for u8 {
	fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
		Self::decode_remaining(buf, 1)?;
		Ok(buf.get_u8())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::BytesMut;

	#[test]
	fn roundtrip() {
		for v in [0u64, 1, 63, 64, 16383, 16384, (1 << 30) - 1, 1 << 30, MAX_VARINT] {
			let mut buf = BytesMut::new();
			v.encode(&mut buf).unwrap();
			assert_eq!(u64::decode(&mut buf).unwrap(), v);
			assert!(buf.is_empty());
		}
	}

	#[test]
	fn exact_bytes() {
		let mut buf = BytesMut::new();
		37u64.encode(&mut buf).unwrap();
		assert_eq!(buf.to_vec(), vec![0x25]);

		buf.clear();
		15293u64.encode(&mut buf).unwrap();
		assert_eq!(buf.to_vec(), vec![0x7b, 0xbd]);

		buf.clear();
		494878333u64.encode(&mut buf).unwrap();
		assert_eq!(buf.to_vec(), vec![0x9d, 0x7f, 0x3e, 0x7d]);
	}

	#[test]
	fn too_large() {
		let mut buf = BytesMut::new();
		assert!(matches!(
			(MAX_VARINT + 1).encode(&mut buf),
			Err(EncodeError::BoundsExceeded)
		));
	}

	#[test]
	fn partial() {
		let mut buf = BytesMut::new();
		16384u64.encode(&mut buf).unwrap();

		let mut partial = buf.split_to(2);
		assert!(matches!(u64::decode(&mut partial), Err(DecodeError::More(2))));
	}
}
