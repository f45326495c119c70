//! Growing-buffer negotiation for variable-length reads.
//!
//! Every read from the store writes into caller-supplied buffers whose
//! required size is not known up front. [`negotiate`] calls the operation
//! with a non-zero starting capacity and, while the store answers
//! [`Status::MORE_DATA`], grows the buffers by a fixed increment and tries
//! again. The size hint some entry points return alongside `MORE_DATA` is
//! ignored; not every entry point fills it in reliably.
//!
//! Name and data buffers grow together: an overflow of either grows both.
//! Any status other than `MORE_DATA` ends the loop and is returned as is.

use clusreg_core::Status;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::api::{EnumeratedValue, QueriedValue};

/// Starting capacity and fixed per-retry increment of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Growth {
    pub initial: usize,
    pub increment: usize,
}

impl Growth {
    /// A channel that is not used by the operation. Any zero/zero growth
    /// counts as unused.
    pub const NONE: Growth = Growth {
        initial: 0,
        increment: 0,
    };

    pub const fn new(initial: usize, increment: usize) -> Self {
        Growth { initial, increment }
    }

    fn is_none(&self) -> bool {
        *self == Growth::NONE
    }

    // A zero-length buffer can read as "no buffer" to the callee.
    fn start(&self) -> usize {
        if self.is_none() {
            0
        } else {
            self.initial.max(1)
        }
    }

    fn step(&self) -> usize {
        if self.is_none() {
            0
        } else {
            self.increment.max(1)
        }
    }
}

/// Buffer sizing for reads against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPolicy {
    /// Name buffer, in UTF-16 units.
    pub name: Growth,
    /// Data buffer, in bytes.
    pub data: Growth,
    /// Ceiling on the combined size of both buffers, in bytes.
    pub limit: usize,
}

impl BufferPolicy {
    pub const DEFAULT_LIMIT: usize = 64 * 1024 * 1024;

    /// The same policy with the name channel switched off.
    pub fn data_only(&self) -> Self {
        BufferPolicy {
            name: Growth::NONE,
            ..*self
        }
    }

    /// The same policy with the data channel switched off.
    pub fn name_only(&self) -> Self {
        BufferPolicy {
            data: Growth::NONE,
            ..*self
        }
    }
}

impl Default for BufferPolicy {
    fn default() -> Self {
        BufferPolicy {
            name: Growth::new(64, 64),
            data: Growth::new(256, 256),
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Sizes a successful call reports back.
pub trait Reported {
    /// UTF-16 units written to the name buffer.
    fn name_len(&self) -> usize {
        0
    }
    /// Bytes written to the data buffer.
    fn data_len(&self) -> usize {
        0
    }
}

impl Reported for QueriedValue {
    fn data_len(&self) -> usize {
        self.data_len
    }
}

impl Reported for EnumeratedValue {
    fn name_len(&self) -> usize {
        self.name_len
    }
    fn data_len(&self) -> usize {
        self.data_len
    }
}

/// A bare name length, as reported by key enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameLen(pub usize);

impl Reported for NameLen {
    fn name_len(&self) -> usize {
        self.0
    }
}

/// Buffers trimmed to exactly the reported sizes.
#[derive(Debug)]
pub struct Negotiated<T> {
    pub name: Vec<u16>,
    pub data: Vec<u8>,
    pub reported: T,
    /// Number of calls made, including the successful one.
    pub attempts: u32,
}

/// Why a negotiation gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationError {
    /// The operation failed with something other than `MORE_DATA`.
    Status(Status),
    /// Growing further would pass [`BufferPolicy::limit`].
    LimitExceeded { limit: usize },
    /// The operation claimed to write more than the buffer holds.
    Overrun { reported: usize, capacity: usize },
}

/// Call `op` with growing buffers until it stops asking for more space.
pub fn negotiate<T, F>(policy: &BufferPolicy, mut op: F) -> Result<Negotiated<T>, NegotiationError>
where
    T: Reported,
    F: FnMut(&mut [u16], &mut [u8]) -> Result<T, Status>,
{
    let mut name = vec![0u16; policy.name.start()];
    let mut data = vec![0u8; policy.data.start()];
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        trace!(attempts, name_cap = name.len(), data_cap = data.len(), "sized call");
        match op(&mut name, &mut data) {
            Ok(reported) => {
                let (name_len, data_len) = (reported.name_len(), reported.data_len());
                if name_len > name.len() {
                    return Err(NegotiationError::Overrun {
                        reported: name_len,
                        capacity: name.len(),
                    });
                }
                if data_len > data.len() {
                    return Err(NegotiationError::Overrun {
                        reported: data_len,
                        capacity: data.len(),
                    });
                }
                name.truncate(name_len);
                name.shrink_to_fit();
                data.truncate(data_len);
                data.shrink_to_fit();
                return Ok(Negotiated {
                    name,
                    data,
                    reported,
                    attempts,
                });
            }
            Err(Status::MORE_DATA) => {
                if policy.name.step() == 0 && policy.data.step() == 0 {
                    // Nothing can grow.
                    return Err(NegotiationError::LimitExceeded {
                        limit: policy.limit,
                    });
                }
                let name_cap = name.len() + policy.name.step();
                let data_cap = data.len() + policy.data.step();
                if name_cap * 2 + data_cap > policy.limit {
                    return Err(NegotiationError::LimitExceeded {
                        limit: policy.limit,
                    });
                }
                debug!(attempts, name_cap, data_cap, "buffer too small, growing");
                name.resize(name_cap, 0);
                data.resize(data_cap, 0);
            }
            Err(status) => return Err(NegotiationError::Status(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusreg_core::ValueType;

    fn small_policy() -> BufferPolicy {
        BufferPolicy {
            name: Growth::new(4, 4),
            data: Growth::new(16, 16),
            limit: 1 << 20,
        }
    }

    /// A store that holds one payload and answers like the native call.
    fn serve(payload: &[u8]) -> impl FnMut(&mut [u16], &mut [u8]) -> Result<QueriedValue, Status> + '_ {
        move |_name, data| {
            if data.len() < payload.len() {
                return Err(Status::MORE_DATA);
            }
            data[..payload.len()].copy_from_slice(payload);
            Ok(QueriedValue {
                value_type: ValueType::BINARY,
                data_len: payload.len(),
            })
        }
    }

    #[test]
    fn crosses_growth_thresholds() {
        let policy = small_policy().data_only();
        for size in [0usize, 1, 15, 16, 17, 255, 256, 4096] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let got = negotiate(&policy, serve(&payload)).unwrap();
            assert_eq!(got.data, payload, "size {size}");
            assert!(got.name.is_empty());
            let expected_attempts = if size <= 16 { 1 } else { (size - 16).div_ceil(16) + 1 };
            assert_eq!(got.attempts as usize, expected_attempts, "size {size}");
        }
    }

    #[test]
    fn result_is_trimmed_to_reported_size() {
        let got = negotiate(&small_policy().data_only(), serve(b"abc")).unwrap();
        assert_eq!(got.data, b"abc");
        assert_eq!(got.attempts, 1);
    }

    #[test]
    fn zero_capacity_policy_still_passes_a_buffer() {
        let policy = BufferPolicy {
            name: Growth::NONE,
            data: Growth::new(0, 1),
            limit: 1 << 10,
        };
        let mut seen = Vec::new();
        let got = negotiate(&policy, |_n: &mut [u16], d: &mut [u8]| {
            seen.push(d.len());
            if d.len() < 3 {
                return Err(Status::MORE_DATA);
            }
            d[..3].copy_from_slice(b"xyz");
            Ok(QueriedValue {
                value_type: ValueType::BINARY,
                data_len: 3,
            })
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(got.data, b"xyz");
    }

    #[test]
    fn other_failures_surface_immediately() {
        let mut calls = 0;
        let err = negotiate(&small_policy(), |_n: &mut [u16], _d: &mut [u8]| {
            calls += 1;
            Err::<QueriedValue, _>(Status::ACCESS_DENIED)
        })
        .unwrap_err();
        assert_eq!(err, NegotiationError::Status(Status::ACCESS_DENIED));
        assert_eq!(calls, 1);
    }

    #[test]
    fn failure_after_growth_is_not_masked() {
        let mut calls = 0;
        let err = negotiate(&small_policy(), |_n: &mut [u16], _d: &mut [u8]| {
            calls += 1;
            if calls < 3 {
                Err::<QueriedValue, _>(Status::MORE_DATA)
            } else {
                Err(Status::FILE_NOT_FOUND)
            }
        })
        .unwrap_err();
        assert_eq!(err, NegotiationError::Status(Status::FILE_NOT_FOUND));
        assert_eq!(calls, 3);
    }

    #[test]
    fn endless_more_data_hits_the_limit() {
        let policy = BufferPolicy {
            limit: 1024,
            ..small_policy()
        };
        let err = negotiate(&policy, |_n: &mut [u16], _d: &mut [u8]| {
            Err::<QueriedValue, _>(Status::MORE_DATA)
        })
        .unwrap_err();
        assert_eq!(err, NegotiationError::LimitExceeded { limit: 1024 });
    }

    #[test]
    fn overrun_is_reported_not_panicked() {
        let err = negotiate(&small_policy().data_only(), |_n: &mut [u16], d: &mut [u8]| {
            Ok(QueriedValue {
                value_type: ValueType::BINARY,
                data_len: d.len() + 1,
            })
        })
        .unwrap_err();
        assert_eq!(
            err,
            NegotiationError::Overrun {
                reported: 17,
                capacity: 16
            }
        );
    }

    #[test]
    fn name_and_data_grow_in_lock_step() {
        let name: Vec<u16> = "a-rather-long-value-name".encode_utf16().collect();
        let mut caps = Vec::new();
        let got = negotiate(&small_policy(), |n: &mut [u16], d: &mut [u8]| {
            caps.push((n.len(), d.len()));
            // Name must fit along with its NUL.
            if n.len() < name.len() + 1 {
                return Err(Status::MORE_DATA);
            }
            n[..name.len()].copy_from_slice(&name);
            d[0] = 7;
            Ok(EnumeratedValue {
                value_type: ValueType::DWORD,
                name_len: name.len(),
                data_len: 1,
            })
        })
        .unwrap();
        assert_eq!(got.name, name);
        assert_eq!(got.data, vec![7]);
        for (i, (n, d)) in caps.iter().enumerate() {
            assert_eq!(*n, 4 + 4 * i);
            assert_eq!(*d, 16 + 16 * i);
        }
    }
}
