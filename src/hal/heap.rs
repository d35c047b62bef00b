//! Global allocator backing the timer records on the ATmega128

use avr_device::interrupt::Mutex;
use core::alloc::{GlobalAlloc, Layout};
use core::cell::RefCell;
use core::mem::MaybeUninit;
use core::ptr::{null_mut, NonNull};
use linked_list_allocator::Heap;

/// Heap size in bytes, out of the 4KiB of internal SRAM
pub const HEAP_SIZE: usize = 1024;

static mut HEAP_MEMORY: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];

pub struct GlobalAllocator(Mutex<RefCell<Heap>>);

impl GlobalAllocator {
    pub const fn empty() -> Self {
        Self(Mutex::new(RefCell::new(Heap::empty())))
    }

    /// Hand the static heap region to the allocator. Call once, before the
    /// first allocation.
    pub fn init(&self) {
        avr_device::interrupt::free(|cs| unsafe {
            let bottom = core::ptr::addr_of_mut!(HEAP_MEMORY) as *mut u8;
            self.0.borrow(cs).borrow_mut().init(bottom, HEAP_SIZE);
        });
    }
}

unsafe impl GlobalAlloc for GlobalAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        avr_device::interrupt::free(|cs| {
            self.0
                .borrow(cs)
                .borrow_mut()
                .allocate_first_fit(layout)
                .map_or(null_mut(), |block| block.as_ptr())
        })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(block) = NonNull::new(ptr) {
            avr_device::interrupt::free(|cs| {
                self.0.borrow(cs).borrow_mut().deallocate(block, layout);
            });
        }
    }
}

#[global_allocator]
pub static GLOBAL_ALLOCATOR: GlobalAllocator = GlobalAllocator::empty();
