use alloc::collections::BTreeMap;
use core::fmt;
use core::mem;

use enumflags2::{bitflags, BitFlags};

use crate::{PhysAddr, PhysPageNum, VirtPageNum};

/// 页表，由页帧表调用
pub trait PageDirectory {
    /// `vpn`当前映射的物理页
    fn get_mapping(&self, vpn: VirtPageNum) -> Option<PhysPageNum>;
    /// 建立映射 `vpn -> ppn`
    fn install(
        &mut self,
        vpn: VirtPageNum,
        ppn: PhysPageNum,
        writable: bool,
    ) -> Result<(), InstallError>;
    /// `vpn`对应页表项的地址；`create`为真时沿途创建缺失的表项。
    /// `vpn`不在页表范围内时为`None`
    fn lookup_entry(&mut self, vpn: VirtPageNum, create: bool) -> Option<EntryAddr>;
    /// 读取页表项所指的物理页
    fn entry_page(&self, entry: EntryAddr) -> Option<PhysPageNum>;
}

/// 页表项
///
/// - [10:] PPN
/// - [8:9] 未知
/// - [0:7] 保护位
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Entry(usize);

/// 保护位
/// - V(Valid)：仅当位 V 为 1 时，页表项才是合法的；
/// - R/W/X：是否允许读/写/执行；
/// - U(User)：用户态能否访问；
/// - A(Accessed)/D(Dirty)：由硬件记录的访问位与脏位。
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PTEFlag {
    V = 0b0000_0001,
    R = 0b0000_0010,
    W = 0b0000_0100,
    X = 0b0000_1000,
    U = 0b0001_0000,
    G = 0b0010_0000,
    A = 0b0100_0000,
    D = 0b1000_0000,
}

/// 页表项的物理地址，页帧表据此区分引用者
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryAddr(usize);

#[derive(Debug, PartialEq, Eq)]
pub enum InstallError {
    /// 虚拟页已有映射
    Mapped(VirtPageNum),
    /// 虚拟页超出页表范围
    OutOfRange(VirtPageNum),
}

#[derive(Debug)]
pub struct UnmappedVpn(pub VirtPageNum);

/// 一级的软件页表：表项放在内存的有序表里，
/// 表项地址按 `根页地址 + vpn * 表项大小` 计算，同一张表内互不相同。
#[derive(Debug)]
pub struct SoftPageTable {
    root: PhysPageNum,
    entries: BTreeMap<VirtPageNum, Entry>,
}

impl SoftPageTable {
    /// 可容纳的页表项数量
    pub const CAPACITY: usize = 512;

    pub fn new(root: PhysPageNum) -> Self {
        Self {
            root,
            entries: BTreeMap::new(),
        }
    }

    /// 清空`vpn`的表项
    pub fn unmap(&mut self, vpn: VirtPageNum) -> Result<(), UnmappedVpn> {
        match self.entries.get_mut(&vpn) {
            Some(pte) if pte.is_valid() => {
                pte.clean();
                Ok(())
            }
            _ => Err(UnmappedVpn(vpn)),
        }
    }

    /// 凭借虚拟页号访问页表项
    #[inline]
    pub fn translate(&self, vpn: VirtPageNum) -> Option<&Entry> {
        self.entries.get(&vpn)
    }

    /// 一级页表只容纳 [`Self::CAPACITY`] 条表项
    #[inline]
    fn contains(vpn: VirtPageNum) -> bool {
        usize::from(vpn) < Self::CAPACITY
    }

    fn entry_addr(&self, vpn: VirtPageNum) -> Option<EntryAddr> {
        Self::contains(vpn).then(|| {
            EntryAddr(
                usize::from(PhysAddr::from(self.root)) + usize::from(vpn) * mem::size_of::<Entry>(),
            )
        })
    }

    fn entry_vpn(&self, entry: EntryAddr) -> Option<VirtPageNum> {
        let offset = entry.0.checked_sub(usize::from(PhysAddr::from(self.root)))?;
        let index = offset / mem::size_of::<Entry>();
        (offset % mem::size_of::<Entry>() == 0 && index < Self::CAPACITY)
            .then_some(VirtPageNum::from_raw(index))
    }
}

impl PageDirectory for SoftPageTable {
    fn get_mapping(&self, vpn: VirtPageNum) -> Option<PhysPageNum> {
        self.translate(vpn)
            .filter(|pte| pte.is_valid())
            .map(Entry::ppn)
    }

    fn install(
        &mut self,
        vpn: VirtPageNum,
        ppn: PhysPageNum,
        writable: bool,
    ) -> Result<(), InstallError> {
        if !Self::contains(vpn) {
            return Err(InstallError::OutOfRange(vpn));
        }
        let pte = self.entries.entry(vpn).or_default();
        if pte.is_valid() {
            return Err(InstallError::Mapped(vpn));
        }

        let mut flags = PTEFlag::V | PTEFlag::R | PTEFlag::U;
        if writable {
            flags |= PTEFlag::W;
        }
        *pte = Entry::new(ppn, flags);

        Ok(())
    }

    fn lookup_entry(&mut self, vpn: VirtPageNum, create: bool) -> Option<EntryAddr> {
        let addr = self.entry_addr(vpn)?;
        if create {
            self.entries.entry(vpn).or_default();
        }
        self.entries.contains_key(&vpn).then_some(addr)
    }

    fn entry_page(&self, entry: EntryAddr) -> Option<PhysPageNum> {
        let vpn = self.entry_vpn(entry)?;
        self.get_mapping(vpn)
    }
}

impl Entry {
    pub fn new(ppn: PhysPageNum, flags: impl Into<BitFlags<PTEFlag>>) -> Self {
        Self(usize::from(ppn) << 10 | flags.into().bits() as usize)
    }

    pub fn clean(&mut self) {
        *self = Self(0);
    }

    pub fn ppn(&self) -> PhysPageNum {
        PhysPageNum::from_raw(self.0 >> 10)
    }

    pub fn flags(&self) -> BitFlags<PTEFlag> {
        // 缩减usize为u8，得到低8位的二进制标志位
        BitFlags::from_bits_truncate(self.0 as u8)
    }

    pub fn is_valid(&self) -> bool {
        self.flags().contains(PTEFlag::V)
    }

    pub fn is_writable(&self) -> bool {
        self.flags().contains(PTEFlag::W)
    }
}

impl fmt::Debug for EntryAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pte@{:#x}", self.0)
    }
}
