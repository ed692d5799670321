//! Device buffers
//!
//! Kernels share buffers across device threads, so every element is an
//! atomic. Relaxed ordering is enough: the dispatch boundary is the only
//! point where one kernel's writes must become visible to the next.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::Dispatcher;

macro_rules! atomic_buffer {
    ($name:ident, $atomic:ty, $value:ty) => {
        /// Fixed-size array of atomics shared by kernel invocations
        #[derive(Debug, Default)]
        pub struct $name {
            data: Vec<$atomic>,
        }

        impl $name {
            /// Allocate `len` elements set to `fill`
            pub fn new(len: usize, fill: $value) -> Self {
                Self {
                    data: (0..len).map(|_| <$atomic>::new(fill)).collect(),
                }
            }

            /// Copy a host slice into a new buffer
            pub fn from_slice(values: &[$value]) -> Self {
                Self {
                    data: values.iter().map(|&v| <$atomic>::new(v)).collect(),
                }
            }

            #[inline]
            pub fn len(&self) -> usize {
                self.data.len()
            }

            #[inline]
            pub fn is_empty(&self) -> bool {
                self.data.is_empty()
            }

            #[inline]
            pub fn load(&self, index: usize) -> $value {
                self.data[index].load(Ordering::Relaxed)
            }

            #[inline]
            pub fn store(&self, index: usize, value: $value) {
                self.data[index].store(value, Ordering::Relaxed)
            }

            /// Atomic minimum, returning the previous value
            #[inline]
            pub fn fetch_min(&self, index: usize, value: $value) -> $value {
                self.data[index].fetch_min(value, Ordering::Relaxed)
            }

            /// Wrapping atomic add, returning the previous value
            #[inline]
            pub fn fetch_add(&self, index: usize, value: $value) -> $value {
                self.data[index].fetch_add(value, Ordering::Relaxed)
            }

            /// Store `new` only if the slot still holds `current`
            #[inline]
            pub fn compare_exchange(&self, index: usize, current: $value, new: $value) -> Result<$value, $value> {
                self.data[index].compare_exchange(current, new, Ordering::Relaxed, Ordering::Relaxed)
            }

            /// Reset every element to `value` with a kernel
            pub fn fill(&self, dispatcher: &Dispatcher, value: $value) {
                dispatcher.dispatch(concat!(stringify!($name), "::fill"), self.len(), |i| self.store(i, value));
            }

            /// Read the buffer back to the host
            pub fn to_vec(&self) -> Vec<$value> {
                self.data.iter().map(|v| v.load(Ordering::Relaxed)).collect()
            }
        }
    };
}

atomic_buffer!(AtomicBufferU32, AtomicU32, u32);
atomic_buffer!(AtomicBufferU64, AtomicU64, u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_read_back() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let buffer = AtomicBufferU64::new(8, 0);
        buffer.fill(&dispatcher, u64::MAX);
        assert!(buffer.to_vec().iter().all(|&v| v == u64::MAX));
    }

    #[test]
    fn test_concurrent_fetch_min() {
        let dispatcher = Dispatcher::new(4).unwrap();
        let buffer = AtomicBufferU32::new(1, u32::MAX);
        dispatcher.dispatch("min", 1000, |tid| {
            buffer.fetch_min(0, 1000 - tid as u32);
        });
        assert_eq!(buffer.load(0), 1);
    }

    #[test]
    fn test_compare_exchange() {
        let buffer = AtomicBufferU64::from_slice(&[0, 5]);
        assert_eq!(buffer.compare_exchange(0, 0, 9), Ok(0));
        assert_eq!(buffer.compare_exchange(0, 0, 3), Err(9));
        assert_eq!(buffer.to_vec(), vec![9, 5]);
    }
}
