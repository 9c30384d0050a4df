use serde::{de::DeserializeOwned, Serialize};

use crate::fs::{FsError, FsResult};

/// Trait for digesting an object which stores digest in the object itself
pub trait DigestInSelf {
    fn digest(&mut self) -> FsResult<()>;
    fn verify_digest(&mut self) -> FsResult<bool>;
}

/// Trait for serializing and deserializing an object which stores digest in the object itself
/// # Note
/// This trait is implemented for all types implementing
/// [Serialize] and [DeserializeOwned] and [DigestInSelf]
pub trait SerializeAndDigest: Serialize + DeserializeOwned + DigestInSelf {
    /// serialize into a [Vec](std::vec::Vec)
    fn serialize(&mut self) -> FsResult<Vec<u8>> {
        self.digest()?;
        let config = bincode::config::legacy();
        Ok(bincode::serde::encode_to_vec(&*self, config)?)
    }

    /// serialize into a fixed-size on-disk slot, zeroing the unused tail
    /// # Returns
    /// The number of bytes the record occupies
    fn serialize_into_slot(&mut self, slot: &mut [u8]) -> FsResult<usize> {
        let bytes = self.serialize()?;
        if bytes.len() > slot.len() {
            return Err(FsError::Codec(format!(
                "record needs {} bytes but its slot holds {}",
                bytes.len(),
                slot.len()
            )));
        }
        slot[..bytes.len()].copy_from_slice(&bytes);
        slot[bytes.len()..].fill(0);
        Ok(bytes.len())
    }

    /// deserialize from a slice
    /// # Returns
    /// A tuple containing the deserialized object and the number of bytes read
    fn deserialize(buf: &[u8]) -> FsResult<(Self, usize)> {
        let config = bincode::config::legacy();
        let (mut object, bytes_read): (Self, usize) =
            bincode::serde::decode_from_slice(buf, config)?;
        if !object.verify_digest()? {
            Err(FsError::Corrupted(
                "deserialized object digest verification failed".into(),
            ))
        } else {
            Ok((object, bytes_read))
        }
    }
}
