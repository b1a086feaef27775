#![no_std]

#[cfg(test)]
extern crate std;

extern crate alloc;

pub mod arena;
pub mod klog;
pub mod ring_buffer;

pub use arena::{Arena, ArenaIndex};
pub use klog::{
    KlogLevel, klog_get_level, klog_init, klog_is_enabled, klog_register_backend, klog_set_level,
};
pub use ring_buffer::RingBuffer;
