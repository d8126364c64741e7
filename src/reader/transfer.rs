use crate::core::{ReaderError, ReaderResult};

/// Fixed-size staging memory, allocated lazily and at most once.
///
/// The allocation is released when the buffer is dropped.
#[derive(Debug)]
pub struct TransferBuffer {
    size: usize,
    data: Option<Box<[u8]>>,
}

impl TransferBuffer {
    pub fn new(size: usize) -> Self {
        Self { size, data: None }
    }

    pub fn capacity(&self) -> usize {
        self.size
    }

    pub fn is_allocated(&self) -> bool {
        self.data.is_some()
    }

    /// Allocates the buffer unless that already happened.
    pub fn allocate(&mut self) -> ReaderResult<()> {
        if self.data.is_some() {
            return Ok(());
        }
        if self.size == 0 {
            return Err(ReaderError::Allocation { size: 0 });
        }

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(self.size)
            .map_err(|_| ReaderError::Allocation { size: self.size })?;
        storage.resize(self.size, 0);
        self.data = Some(storage.into_boxed_slice());

        log::debug!("[transfer] allocated {} byte staging buffer", self.size);
        Ok(())
    }

    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        self.data.as_deref_mut()
    }
}
