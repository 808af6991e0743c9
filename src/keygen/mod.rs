// SPDX-License-Identifier: Apache-2.0

//! Primary key generation for sharded tables

pub mod allocator;
pub mod cache;
pub mod memory;
pub mod protocol;
pub mod redis;

pub use allocator::KeyAllocator;
pub use cache::{CacheCapabilities, DistributedCache};
pub use memory::MemoryCache;
pub use redis::RedisCache;
