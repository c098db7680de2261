//! Bag-of-cells codec.
//!
//! Message payloads travel as base64 bags of cells. This module implements
//! the subset the kit needs: ordinary cells only, single-root bags, no index
//! and no checksum on output. Exotic cells and non-zero level masks are
//! rejected outright since wallet payloads never carry them.
//!
//! A [`Cell`] holds up to 1023 data bits and up to four references. Reads go
//! through [`CellSlice`], writes through [`CellBuilder`]. Padding bits past
//! `bit_len` are always zero, which makes equality and hashing structural.

use crate::{address::TonAddress, coins::Coins};
use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
    Engine as _,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{
    collections::{hash_map::Entry, HashMap, VecDeque},
    fmt,
    str::FromStr,
    sync::Arc,
};

const MAGIC: u32 = 0xb5ee_9c72;
const MAX_BITS: usize = 1023;
const MAX_REFS: usize = 4;
/// Decoder allocation guard. Wallet payloads stay far below this.
const MAX_CELLS: usize = 1 << 16;

/// Errors produced by the cell codec.
#[derive(Debug, thiserror::Error)]
pub enum BocError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid magic {0:#010x}")]
    InvalidMagic(u32),
    #[error("bag declares absent cells")]
    AbsentCells,
    #[error("expected a single root, got {0}")]
    MultipleRoots(usize),
    #[error("bag declares {0} cells, refusing to decode")]
    TooManyCells(usize),
    #[error("exotic cells are not supported")]
    ExoticCell,
    #[error("cell capacity exceeded")]
    CellOverflow,
    #[error("cell data exhausted")]
    CellUnderflow,
    #[error("value does not fit the requested encoding")]
    ValueOutOfRange,
    #[error("cell {cell} references cell {reference} out of order")]
    InvalidRef { cell: usize, reference: usize },
    #[error("unsupported address encoding")]
    InvalidAddress,
    #[error("malformed bag of cells: {0}")]
    NonCanonical(&'static str),
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
}

/// An ordinary cell: up to 1023 data bits and up to four references.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl Cell {
    pub fn builder() -> CellBuilder {
        CellBuilder::new()
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn references(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    /// Starts reading from the first bit.
    pub fn parse(&self) -> CellSlice<'_> {
        CellSlice { cell: self, bit_pos: 0, ref_pos: 0 }
    }

    /// Zero for a leaf, one more than the deepest reference otherwise.
    pub fn depth(&self) -> u16 {
        self.refs.iter().map(|r| r.depth() + 1).max().unwrap_or(0)
    }

    /// The standard representation hash: sha256 over the two descriptor
    /// bytes, the data with its completion tag, then the depth and hash
    /// of each reference. Signatures over cells sign this digest.
    pub fn repr_hash(&self) -> [u8; 32] {
        let mut repr = Vec::with_capacity(2 + self.data.len() + self.refs.len() * 34);
        repr.push(self.refs.len() as u8);
        repr.push((2 * (self.bit_len / 8) + usize::from(self.bit_len % 8 != 0)) as u8);
        let mut data = self.data.clone();
        if self.bit_len % 8 != 0 {
            data[self.data.len() - 1] |= 0x80 >> (self.bit_len % 8);
        }
        repr.extend_from_slice(&data);
        for r in &self.refs {
            repr.extend_from_slice(&r.depth().to_be_bytes());
        }
        for r in &self.refs {
            repr.extend_from_slice(&r.repr_hash());
        }
        Sha256::digest(&repr).into()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("bits", &self.bit_len)
            .field("data", &hex::encode(&self.data))
            .field("refs", &self.refs.len())
            .finish()
    }
}

/// Write-side cell construction. All stores check capacity before mutating,
/// so a failed store leaves the builder unchanged.
#[derive(Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> Cell {
        Cell { data: self.data, bit_len: self.bit_len, refs: self.refs }
    }

    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, BocError> {
        self.ensure_capacity(1)?;
        self.push_bit(bit);
        Ok(self)
    }

    /// Stores the low `bits` bits of `value`, most significant first.
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self, BocError> {
        if bits > 64 || (bits < 64 && value >> bits != 0) {
            return Err(BocError::ValueOutOfRange);
        }
        self.ensure_capacity(bits)?;
        for i in (0..bits).rev() {
            self.push_bit((value >> i) & 1 == 1);
        }
        Ok(self)
    }

    pub fn store_u32(&mut self, value: u32) -> Result<&mut Self, BocError> {
        self.store_uint(value as u64, 32)
    }

    pub fn store_u64(&mut self, value: u64) -> Result<&mut Self, BocError> {
        self.store_uint(value, 64)
    }

    /// Stores an amount as `VarUInteger 16`: a 4-bit byte count followed by
    /// the minimal big-endian representation.
    pub fn store_coins(&mut self, coins: Coins) -> Result<&mut Self, BocError> {
        let value = coins.as_nano();
        if value >> 120 != 0 {
            return Err(BocError::ValueOutOfRange);
        }
        let byte_len = (128 - value.leading_zeros() as usize).div_ceil(8);
        self.ensure_capacity(4 + byte_len * 8)?;
        self.store_uint(byte_len as u64, 4)?;
        let bytes = value.to_be_bytes();
        for &b in &bytes[16 - byte_len..] {
            self.store_uint(b as u64, 8)?;
        }
        Ok(self)
    }

    /// Stores the first `bits` bits of `data`, most significant first.
    pub fn store_raw(&mut self, data: &[u8], bits: usize) -> Result<&mut Self, BocError> {
        if bits > data.len() * 8 {
            return Err(BocError::ValueOutOfRange);
        }
        self.ensure_capacity(bits)?;
        for i in 0..bits {
            self.push_bit(data[i / 8] & (0x80 >> (i % 8)) != 0);
        }
        Ok(self)
    }

    /// Stores a `MsgAddress`: `addr_none` for `None`, `addr_std` without
    /// anycast otherwise.
    pub fn store_address(&mut self, address: Option<&TonAddress>) -> Result<&mut Self, BocError> {
        match address {
            None => self.store_uint(0b00, 2),
            Some(addr) => {
                self.ensure_capacity(2 + 1 + 8 + 256)?;
                self.store_uint(0b10, 2)?;
                self.store_bit(false)?;
                self.store_uint(addr.workchain() as u8 as u64, 8)?;
                self.store_raw(addr.account_id(), 256)
            }
        }
    }

    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<&mut Self, BocError> {
        if self.refs.len() == MAX_REFS {
            return Err(BocError::CellOverflow);
        }
        self.refs.push(cell);
        Ok(self)
    }

    fn ensure_capacity(&self, bits: usize) -> Result<(), BocError> {
        if self.bit_len + bits > MAX_BITS {
            return Err(BocError::CellOverflow);
        }
        Ok(())
    }

    fn push_bit(&mut self, bit: bool) {
        let byte = self.bit_len / 8;
        if byte == self.data.len() {
            self.data.push(0);
        }
        if bit {
            self.data[byte] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
    }
}

/// Read cursor over a cell's bits and references.
pub struct CellSlice<'a> {
    cell: &'a Cell,
    bit_pos: usize,
    ref_pos: usize,
}

impl<'a> CellSlice<'a> {
    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len - self.bit_pos
    }

    pub fn remaining_refs(&self) -> usize {
        self.cell.refs.len() - self.ref_pos
    }

    pub fn load_bit(&mut self) -> Result<bool, BocError> {
        if self.bit_pos >= self.cell.bit_len {
            return Err(BocError::CellUnderflow);
        }
        let bit = self.cell.data[self.bit_pos / 8] & (0x80 >> (self.bit_pos % 8)) != 0;
        self.bit_pos += 1;
        Ok(bit)
    }

    pub fn load_uint(&mut self, bits: usize) -> Result<u64, BocError> {
        if bits > 64 {
            return Err(BocError::ValueOutOfRange);
        }
        if self.remaining_bits() < bits {
            return Err(BocError::CellUnderflow);
        }
        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | u64::from(self.load_bit()?);
        }
        Ok(value)
    }

    pub fn load_u32(&mut self) -> Result<u32, BocError> {
        self.load_uint(32).map(|v| v as u32)
    }

    pub fn load_u64(&mut self) -> Result<u64, BocError> {
        self.load_uint(64)
    }

    pub fn load_coins(&mut self) -> Result<Coins, BocError> {
        let byte_len = self.load_uint(4)?;
        let mut value = 0u128;
        for _ in 0..byte_len {
            value = (value << 8) | self.load_uint(8)? as u128;
        }
        Ok(Coins::from_nano(value))
    }

    pub fn load_bytes(&mut self, len: usize) -> Result<Vec<u8>, BocError> {
        if self.remaining_bits() < len * 8 {
            return Err(BocError::CellUnderflow);
        }
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.load_uint(8)? as u8);
        }
        Ok(out)
    }

    /// Loads a `MsgAddress`. Only `addr_none` and anycast-free `addr_std`
    /// occur in wallet payloads; the other two constructors are rejected.
    pub fn load_address(&mut self) -> Result<Option<TonAddress>, BocError> {
        match self.load_uint(2)? {
            0b00 => Ok(None),
            0b10 => {
                if self.load_bit()? {
                    return Err(BocError::InvalidAddress);
                }
                let workchain = self.load_uint(8)? as u8 as i8;
                let bytes = self.load_bytes(32)?;
                let mut account = [0u8; 32];
                account.copy_from_slice(&bytes);
                Ok(Some(TonAddress::new(workchain, account)))
            }
            _ => Err(BocError::InvalidAddress),
        }
    }

    pub fn skip_bits(&mut self, bits: usize) -> Result<(), BocError> {
        if self.remaining_bits() < bits {
            return Err(BocError::CellUnderflow);
        }
        self.bit_pos += bits;
        Ok(())
    }

    pub fn load_ref(&mut self) -> Result<&'a Arc<Cell>, BocError> {
        let cell = self.cell.refs.get(self.ref_pos).ok_or(BocError::CellUnderflow)?;
        self.ref_pos += 1;
        Ok(cell)
    }

    /// Loads a `Maybe ^Cell`: a presence bit followed by a reference.
    pub fn load_maybe_ref(&mut self) -> Result<Option<&'a Arc<Cell>>, BocError> {
        if self.load_bit()? {
            self.load_ref().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// A serialized bag of cells, kept as raw bytes.
///
/// The wire form is base64, so the type serializes as a string and parses
/// both the standard and url-safe alphabets.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Boc(Vec<u8>);

impl Boc {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_base64(s: &str) -> Result<Self, BocError> {
        let normalized: String = s
            .trim_end_matches('=')
            .chars()
            .map(|c| match c {
                '-' => '+',
                '_' => '/',
                c => c,
            })
            .collect();
        Ok(Self(STANDARD_NO_PAD.decode(normalized.as_bytes())?))
    }

    /// Serializes a cell tree into a single-root bag.
    pub fn from_root(root: &Arc<Cell>) -> Result<Self, BocError> {
        encode(root).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Deserializes the bag and returns its root cell.
    pub fn parse_root(&self) -> Result<Arc<Cell>, BocError> {
        decode(&self.0)
    }
}

impl fmt::Debug for Boc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Boc({})", self.to_base64())
    }
}

impl fmt::Display for Boc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl FromStr for Boc {
    type Err = BocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl Serialize for Boc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Boc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(de::Error::custom)
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn read(&mut self, len: usize) -> Result<&'a [u8], BocError> {
        let end = self.pos.checked_add(len).ok_or(BocError::UnexpectedEof)?;
        let chunk = self.bytes.get(self.pos..end).ok_or(BocError::UnexpectedEof)?;
        self.pos = end;
        Ok(chunk)
    }

    fn read_u8(&mut self) -> Result<u8, BocError> {
        self.read(1).map(|b| b[0])
    }

    fn read_be(&mut self, len: usize) -> Result<u64, BocError> {
        let chunk = self.read(len)?;
        Ok(chunk.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }
}

fn decode(bytes: &[u8]) -> Result<Arc<Cell>, BocError> {
    let mut r = ByteReader { bytes, pos: 0 };
    let magic = r.read_be(4)? as u32;
    if magic != MAGIC {
        return Err(BocError::InvalidMagic(magic));
    }

    let flags = r.read_u8()?;
    let has_idx = flags & 0x80 != 0;
    let has_crc = flags & 0x40 != 0;
    let has_cache_bits = flags & 0x20 != 0;
    if flags & 0x18 != 0 {
        return Err(BocError::NonCanonical("reserved flag bits set"));
    }
    if has_cache_bits && !has_idx {
        return Err(BocError::NonCanonical("cache bits without an index"));
    }
    let size = (flags & 0x07) as usize;
    if !(1..=4).contains(&size) {
        return Err(BocError::NonCanonical("reference size out of range"));
    }
    let off = r.read_u8()? as usize;
    if !(1..=8).contains(&off) {
        return Err(BocError::NonCanonical("offset size out of range"));
    }

    let cells = r.read_be(size)? as usize;
    let roots = r.read_be(size)? as usize;
    let absent = r.read_be(size)? as usize;
    let tot_cells_size = r.read_be(off)? as usize;
    if cells == 0 || cells > MAX_CELLS {
        return Err(BocError::TooManyCells(cells));
    }
    if roots != 1 {
        return Err(BocError::MultipleRoots(roots));
    }
    if absent != 0 {
        return Err(BocError::AbsentCells);
    }

    let root_idx = r.read_be(size)? as usize;
    if root_idx >= cells {
        return Err(BocError::NonCanonical("root index out of range"));
    }
    if has_idx {
        r.read(cells * off)?;
    }

    let cells_start = r.pos;
    let mut raw: Vec<(Vec<u8>, usize, Vec<usize>)> = Vec::with_capacity(cells);
    for i in 0..cells {
        let d1 = r.read_u8()?;
        if d1 & 0x08 != 0 || d1 >> 5 != 0 {
            return Err(BocError::ExoticCell);
        }
        if d1 & 0x10 != 0 {
            return Err(BocError::NonCanonical("embedded hashes are not supported"));
        }
        let ref_count = (d1 & 0x07) as usize;
        if ref_count > MAX_REFS {
            return Err(BocError::NonCanonical("more than four references"));
        }

        let d2 = r.read_u8()? as usize;
        let byte_len = d2.div_ceil(2);
        let mut data = r.read(byte_len)?.to_vec();
        let bit_len = if d2 % 2 == 0 {
            byte_len * 8
        } else {
            let last = data[byte_len - 1];
            if last == 0 {
                return Err(BocError::NonCanonical("missing completion tag"));
            }
            let partial = 7 - last.trailing_zeros() as usize;
            // clear the tag so padding bits stay zero
            data[byte_len - 1] &= match partial {
                0 => 0,
                p => 0xffu8 << (8 - p),
            };
            (byte_len - 1) * 8 + partial
        };

        let mut ref_idx = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            let idx = r.read_be(size)? as usize;
            if idx <= i || idx >= cells {
                return Err(BocError::InvalidRef { cell: i, reference: idx });
            }
            ref_idx.push(idx);
        }
        raw.push((data, bit_len, ref_idx));
    }
    if r.pos - cells_start != tot_cells_size {
        return Err(BocError::NonCanonical("cell data size mismatch"));
    }
    if has_crc {
        r.read(4)?;
    }

    // references only point forward, so building back to front resolves them
    let mut built: Vec<Option<Arc<Cell>>> = vec![None; cells];
    for (i, (data, bit_len, ref_idx)) in raw.into_iter().enumerate().rev() {
        let mut refs = Vec::with_capacity(ref_idx.len());
        for j in ref_idx {
            let cell = built[j]
                .clone()
                .ok_or(BocError::InvalidRef { cell: i, reference: j })?;
            refs.push(cell);
        }
        built[i] = Some(Arc::new(Cell { data, bit_len, refs }));
    }
    built[root_idx].take().ok_or(BocError::NonCanonical("root cell missing"))
}

fn encode(root: &Arc<Cell>) -> Result<Vec<u8>, BocError> {
    // deduplicate structurally and track the deepest occurrence of each
    // cell, so sorting by depth keeps every reference pointing forward
    let mut depth: HashMap<Arc<Cell>, usize> = HashMap::new();
    let mut order: Vec<Arc<Cell>> = Vec::new();
    let mut queue: VecDeque<(Arc<Cell>, usize)> = VecDeque::new();
    queue.push_back((Arc::clone(root), 0));
    while let Some((cell, d)) = queue.pop_front() {
        match depth.entry(Arc::clone(&cell)) {
            Entry::Vacant(e) => {
                e.insert(d);
                order.push(Arc::clone(&cell));
                if order.len() > MAX_CELLS {
                    return Err(BocError::TooManyCells(order.len()));
                }
                for r in cell.references() {
                    queue.push_back((Arc::clone(r), d + 1));
                }
            }
            Entry::Occupied(mut e) => {
                if d > *e.get() {
                    e.insert(d);
                    for r in cell.references() {
                        queue.push_back((Arc::clone(r), d + 1));
                    }
                }
            }
        }
    }

    let mut cells = order;
    cells.sort_by_key(|c| depth[c]);
    let index: HashMap<Arc<Cell>, usize> =
        cells.iter().enumerate().map(|(i, c)| (Arc::clone(c), i)).collect();

    let size = byte_width(cells.len() as u64);
    let mut payload = Vec::new();
    for cell in &cells {
        payload.push(cell.refs.len() as u8);
        payload.push((2 * (cell.bit_len / 8) + usize::from(cell.bit_len % 8 != 0)) as u8);
        let mut data = cell.data.clone();
        if cell.bit_len % 8 != 0 {
            // completion tag marks where the data bits end
            data[cell.data.len() - 1] |= 0x80 >> (cell.bit_len % 8);
        }
        payload.extend_from_slice(&data);
        for r in &cell.refs {
            write_be(&mut payload, index[r] as u64, size);
        }
    }

    let off = byte_width(payload.len() as u64);
    let mut out = Vec::with_capacity(payload.len() + 16);
    out.extend_from_slice(&MAGIC.to_be_bytes());
    out.push(size as u8);
    out.push(off as u8);
    write_be(&mut out, cells.len() as u64, size);
    write_be(&mut out, 1, size);
    write_be(&mut out, 0, size);
    write_be(&mut out, payload.len() as u64, off);
    write_be(&mut out, 0, size);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn byte_width(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn write_be(out: &mut Vec<u8>, value: u64, len: usize) {
    out.extend_from_slice(&value.to_be_bytes()[8 - len..]);
}
