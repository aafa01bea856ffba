use std::thread;

use enumflags2::BitFlags;
use vm::{
    FrameError, FrameTable, PageAllocator, PageDirectory, PageFlag, PhysPageNum,
    SoftPageTable, StackFrameAllocator, VirtPageNum, VmLock,
};

fn vpn(raw: usize) -> VirtPageNum {
    VirtPageNum::from_raw(raw)
}

fn ppn(raw: usize) -> PhysPageNum {
    PhysPageNum::from_raw(raw)
}

/// `pages` 个物理页，从 0x80000 开始
fn table(pages: usize) -> FrameTable<StackFrameAllocator> {
    FrameTable::new(StackFrameAllocator::new(ppn(0x80000)..ppn(0x80000 + pages)))
}

fn page_table(root: usize) -> SoftPageTable {
    SoftPageTable::new(ppn(root))
}

fn no_flags() -> BitFlags<PageFlag> {
    BitFlags::empty()
}

#[test]
fn distinct_pages_are_independent_frames() {
    let mut frames = table(8);
    let mut pt = page_table(0x100);

    let a = frames.acquire_frame(no_flags(), &mut pt, vpn(1), true).unwrap();
    let b = frames.acquire_frame(no_flags(), &mut pt, vpn(2), false).unwrap();
    assert_ne!(a, b);
    assert_eq!(frames.len(), 2);
    assert_eq!(pt.get_mapping(vpn(1)), Some(a));
    assert_eq!(pt.get_mapping(vpn(2)), Some(b));
    assert!(pt.translate(vpn(1)).unwrap().is_writable());
    assert!(!pt.translate(vpn(2)).unwrap().is_writable());

    let entry_a = pt.lookup_entry(vpn(1), false).unwrap();
    let entry_b = pt.lookup_entry(vpn(2), false).unwrap();
    assert_eq!(frames.references(a), [entry_a]);
    assert_eq!(frames.references(b), [entry_b]);

    frames.release_frame(&pt, entry_a);
    assert!(!frames.is_resident(a));
    assert!(frames.is_resident(b));
    assert_eq!(frames.references(b), [entry_b]);
    assert_eq!(frames.allocator().allocated(), 1);

    frames.release_frame(&pt, entry_b);
    assert!(frames.is_empty());
    assert_eq!(frames.allocator().allocated(), 0);
}

#[test]
fn failed_install_returns_the_page() {
    let mut frames = table(4);
    let mut pt = page_table(0x100);

    frames.acquire_frame(no_flags(), &mut pt, vpn(5), true).unwrap();
    assert_eq!(
        frames.acquire_frame(no_flags(), &mut pt, vpn(5), true),
        Err(FrameError::AlreadyMapped(vpn(5)))
    );
    assert_eq!(frames.len(), 1);
    assert_eq!(frames.allocator().allocated(), 1);
    assert_eq!(frames.allocator().available(), 3);
}

#[test]
fn vpn_out_of_the_page_table_returns_the_page() {
    let mut frames = table(4);
    let mut pt = page_table(0x100);
    let beyond = vpn(SoftPageTable::CAPACITY);

    assert_eq!(
        frames.acquire_frame(no_flags(), &mut pt, beyond, true),
        Err(FrameError::OutOfRange(beyond))
    );
    assert!(frames.is_empty());
    assert_eq!(frames.allocator().allocated(), 0);
    assert_eq!(frames.allocator().available(), 4);
}

#[test]
fn exhausted_allocator_is_reported() {
    let mut frames = table(1);
    let mut pt = page_table(0x100);

    frames.acquire_frame(no_flags(), &mut pt, vpn(0), true).unwrap();
    assert_eq!(
        frames.acquire_frame(no_flags(), &mut pt, vpn(1), true),
        Err(FrameError::OutOfMemory)
    );
    assert_eq!(pt.get_mapping(vpn(1)), None);
}

#[test]
#[should_panic]
fn assert_flag_panics_when_exhausted() {
    let mut frames = table(0);
    let mut pt = page_table(0x100);
    let _ = frames.acquire_frame(PageFlag::Assert.into(), &mut pt, vpn(0), true);
}

#[test]
fn shared_page_is_freed_with_its_last_reference() {
    let mut frames = table(4);
    let mut pt_a = page_table(0x100);
    let mut pt_b = page_table(0x101);

    let page = frames.acquire_frame(no_flags(), &mut pt_a, vpn(3), false).unwrap();
    frames.share_frame(&mut pt_b, vpn(7), page, false).unwrap();
    assert_eq!(pt_b.get_mapping(vpn(7)), Some(page));

    let entry_a = pt_a.lookup_entry(vpn(3), false).unwrap();
    let entry_b = pt_b.lookup_entry(vpn(7), false).unwrap();
    assert_ne!(entry_a, entry_b);
    assert_eq!(frames.references(page).len(), 2);
    assert_eq!(frames.len(), 1);
    let frame = frames.frame(page).unwrap();
    assert_eq!(frame.ppn(), page);
    assert!(frame.entries().contains(&entry_a));

    frames.release_frame(&pt_a, entry_a);
    assert!(frames.is_resident(page));
    assert_eq!(frames.references(page), [entry_b]);
    assert_eq!(frames.allocator().allocated(), 1);

    frames.release_frame(&pt_b, entry_b);
    assert!(!frames.is_resident(page));
    assert_eq!(frames.allocator().allocated(), 0);
}

#[test]
fn sharing_requires_a_resident_page() {
    let mut frames = table(4);
    let mut pt = page_table(0x100);
    assert_eq!(
        frames.share_frame(&mut pt, vpn(1), ppn(0x80002), true),
        Err(FrameError::NotResident(ppn(0x80002)))
    );
    assert_eq!(pt.get_mapping(vpn(1)), None);
}

#[test]
fn releasing_an_unknown_entry_is_ignored() {
    let mut frames = table(4);
    let mut pt = page_table(0x100);
    let page = frames.acquire_frame(no_flags(), &mut pt, vpn(1), true).unwrap();

    let unused = pt.lookup_entry(vpn(9), true).unwrap();
    frames.release_frame(&pt, unused);

    let entry = pt.lookup_entry(vpn(1), false).unwrap();
    frames.release_frame(&pt, entry);
    assert!(!frames.is_resident(page));
    // 同一项重复归还不会再次释放物理页
    frames.release_frame(&pt, entry);
    assert_eq!(frames.allocator().allocated(), 0);
}

#[test]
fn zero_flag_clears_recycled_pages() {
    let mut frames = table(1);
    let mut pt = page_table(0x100);

    let page = frames.acquire_frame(no_flags(), &mut pt, vpn(1), true).unwrap();
    frames.allocator_mut().page_bytes_mut(page).fill(0xAB);
    let entry = pt.lookup_entry(vpn(1), false).unwrap();
    frames.release_frame(&pt, entry);
    pt.unmap(vpn(1)).unwrap();

    let again = frames.acquire_frame(no_flags(), &mut pt, vpn(1), true).unwrap();
    assert_eq!(again, page);
    assert!(frames.allocator().page_bytes(page).iter().all(|&b| b == 0xAB));
    frames.release_frame(&pt, entry);
    pt.unmap(vpn(1)).unwrap();

    let zeroed = frames
        .acquire_frame(PageFlag::Zero.into(), &mut pt, vpn(1), true)
        .unwrap();
    assert!(frames.allocator().page_bytes(zeroed).iter().all(|&b| b == 0));
}

#[test]
#[should_panic]
fn double_free_panics() {
    let mut allocator = StackFrameAllocator::new(ppn(0x10)..ppn(0x20));
    let page = allocator.get_page(BitFlags::empty()).unwrap();
    allocator.free_page(page);
    allocator.free_page(page);
}

#[test]
fn threads_share_the_table_under_the_vm_lock() {
    const THREADS: usize = 4;
    const PAGES: usize = 32;
    let lock = VmLock::new(table(THREADS * PAGES));

    thread::scope(|scope| {
        for t in 0..THREADS {
            let lock = &lock;
            scope.spawn(move || {
                let mut pt = page_table(0x100 + t);
                for round in 0..3 {
                    for i in 0..PAGES {
                        lock.lock()
                            .acquire_frame(no_flags(), &mut pt, vpn(i), round % 2 == 0)
                            .unwrap();
                    }
                    for i in 0..PAGES {
                        let entry = pt.lookup_entry(vpn(i), false).unwrap();
                        lock.lock().release_frame(&pt, entry);
                        pt.unmap(vpn(i)).unwrap();
                    }
                }
            });
        }
    });

    let frames = lock.lock();
    assert!(frames.is_empty());
    assert_eq!(frames.allocator().allocated(), 0);
}
