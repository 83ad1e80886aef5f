use kernel_alloc::{BootstrapAllocator, BuddyAllocator, BuddyError, Level};
use kernel_memory_addresses::PhysicalAddress;
use kernel_mmap::{MemoryDescriptor, MemoryKind, UsableRanges, normalize};
use kernel_vmem::FrameAlloc;
use kernel_vmem::sim::SimulatedRam;

/// Small deterministic generator so failures are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// A firmware-style map with a hole, an overlap and a ragged tail.
fn usable() -> UsableRanges {
    let mut map = [
        MemoryDescriptor::new(0x0060_0000, 0x0012_3000, MemoryKind::Free),
        MemoryDescriptor::new(0x0010_0000, 0x0040_0000, MemoryKind::Free),
        MemoryDescriptor::new(0x002F_0000, 0x0001_0000, MemoryKind::Reserved),
        MemoryDescriptor::new(0x0000_0000, 0x000A_0000, MemoryKind::Reserved),
    ];
    normalize(&mut map).expect("usable memory")
}

fn ram_for(ranges: &UsableRanges) -> SimulatedRam {
    let first = ranges.as_slice().first().expect("range");
    let last = ranges.as_slice().last().expect("range");
    SimulatedRam::covering(first.base, last.end())
}

fn rounded(size: u64) -> u64 {
    Level::for_size(size).expect("level").bytes()
}

#[test]
fn random_traffic_never_overlaps_and_conserves_bytes() {
    let ranges = usable();
    let ram = ram_for(&ranges);
    let mut buddy = BuddyAllocator::new(&ram, ranges.as_slice()).expect("init");
    let initial = buddy.stats();
    assert_eq!(initial.managed_bytes, ranges.total_bytes());

    let mut rng = Lcg(0xB0DD1);
    let mut live: Vec<(u64, u64)> = Vec::new();

    for _ in 0..4000 {
        if live.is_empty() || rng.below(3) != 0 {
            let size = 1 + rng.below(0x1_0000);
            match buddy.allocate(size) {
                Ok(a) => {
                    let a = a.as_u64();
                    let len = rounded(size);
                    assert_eq!(a % len, 0, "block not aligned to its size");
                    assert!(
                        ranges.iter().any(|r| r.base <= a && a + len <= r.end()),
                        "{a:#x} outside usable memory"
                    );
                    for &(b, blen) in &live {
                        assert!(a + len <= b || b + rounded(blen) <= a, "overlap");
                    }
                    live.push((a, size));
                }
                Err(e) => assert_eq!(e, BuddyError::OutOfMemory(size)),
            }
        } else {
            let i = usize::try_from(rng.below(live.len() as u64)).expect("index");
            let (a, size) = live.swap_remove(i);
            buddy.free(PhysicalAddress::new(a), size).expect("free");
        }

        let stats = buddy.stats();
        let in_use: u64 = live.iter().map(|&(_, s)| rounded(s)).sum();
        assert_eq!(
            stats.free_bytes + in_use + stats.header_bytes,
            stats.managed_bytes
        );
    }

    for (a, size) in live.drain(..) {
        buddy.free(PhysicalAddress::new(a), size).expect("free");
    }
    assert_eq!(buddy.stats(), initial, "everything coalesced back");
}

#[test]
fn round_trip_reuses_the_address() {
    let ranges = usable();
    let ram = ram_for(&ranges);
    let mut buddy = BuddyAllocator::new(&ram, ranges.as_slice()).expect("init");
    for size in [1, 0x1000, 0x1800, 0x4_0000] {
        let a = buddy.allocate(size).expect("alloc");
        buddy.free(a, size).expect("free");
        assert_eq!(buddy.allocate(size), Ok(a));
        buddy.free(a, size).expect("free");
    }
}

#[test]
fn buddy_never_hands_out_bootstrap_memory() {
    let ranges = usable();
    let ram = ram_for(&ranges);

    let mut boot = BootstrapAllocator::new(ranges.as_slice(), &ram, PhysicalAddress::zero());
    for _ in 0..40 {
        boot.alloc_4k().expect("frame");
    }
    boot.allocate(0x3_0000, true).expect("image");
    let cursor = boot.cursor().as_u64();

    let rest = ranges.exclude_below(cursor);
    let mut buddy = BuddyAllocator::new(&ram, rest.as_slice()).expect("init");
    while let Ok(a) = buddy.allocate(0x1000) {
        assert!(a.as_u64() >= cursor);
    }
}
