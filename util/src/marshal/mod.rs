use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};

pub trait MarshalSize {
    fn marshal_size(&self) -> usize;
}

pub trait Marshal: MarshalSize {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize>;

    fn marshal(&self) -> Result<Bytes> {
        let l = self.marshal_size();
        let mut buf = BytesMut::with_capacity(l);
        buf.resize(l, 0);
        let n = self.marshal_to(&mut buf)?;
        if n != l {
            Err(Error::ErrMarshalSizeMismatch(n, l))
        } else {
            Ok(buf.freeze())
        }
    }
}

pub trait Unmarshal: MarshalSize {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf;
}

#[cfg(test)]
mod test {
    use bytes::BufMut;

    use super::*;

    struct Word(u32);

    impl MarshalSize for Word {
        fn marshal_size(&self) -> usize {
            4
        }
    }

    impl Marshal for Word {
        fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
            if buf.len() < 4 {
                return Err(Error::ErrBufferShort);
            }
            buf.put_u32(self.0);
            Ok(4)
        }
    }

    struct Short;

    impl MarshalSize for Short {
        fn marshal_size(&self) -> usize {
            4
        }
    }

    impl Marshal for Short {
        fn marshal_to(&self, _buf: &mut [u8]) -> Result<usize> {
            Ok(2)
        }
    }

    #[test]
    fn test_marshal_default() {
        let raw = Word(0x01020304).marshal().unwrap();
        assert_eq!(&raw[..], &[1, 2, 3, 4]);

        let err = Short.marshal().unwrap_err();
        assert_eq!(err, Error::ErrMarshalSizeMismatch(2, 4));
    }
}
