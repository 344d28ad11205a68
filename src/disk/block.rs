use crate::api::compare::Comparator;
use crate::api::page::{Entry, Kind, Page, Slot};
use crate::util::bsearch::bsearch;
use bytes::{BufMut, BytesMut};
use crc32fast::Hasher;
use std::mem::size_of;

pub struct Block {
    buf: BytesMut,
}

impl AsMut<[u8]> for Block {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..]
    }
}

impl AsRef<[u8]> for Block {
    fn as_ref(&self) -> &[u8] {
        &self.buf[..]
    }
}

const ID_OFFSET: usize = 0;
const CAP_OFFSET: usize = 4;
const SIZE_OFFSET: usize = 8;
const KIND_OFFSET: usize = 12;
const CRC_OFFSET: usize = 16;
const MAGIC: u32 = 0xC0DE;

impl Block {
    /// Lowest data offset, data area spans from there to the end of the page.
    fn end(&self) -> u32 {
        (0..self.len())
            .filter_map(|idx| self.slot(idx))
            .map(|slot| slot.offset)
            .min()
            .unwrap_or_else(|| self.cap())
    }

    fn checksum(&self) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(&self.buf[..CRC_OFFSET]);
        hasher.update(&self.buf[(CRC_OFFSET + U32)..]);
        hasher.finalize()
    }

    fn put_entry(&mut self, key: &[u8], val: &[u8], page: u32, cmp: Comparator) -> Option<u32> {
        let existing = self.find(key, cmp);
        let reclaimed = existing
            .and_then(|idx| self.slot(idx))
            .map(|slot| slot.klen + slot.vlen + SLOT as u32)
            .unwrap_or_default();
        if self.free() + reclaimed < (key.len() + val.len() + SLOT) as u32 {
            return None;
        }
        if let Some(idx) = existing {
            self.remove(idx);
        }

        let size = self.len();
        let idx = match self.search(key, cmp) {
            Ok(idx) | Err(idx) => idx,
        };

        let mut slots = (0..size)
            .filter_map(|idx| self.slot(idx))
            .collect::<Vec<_>>();

        let klen = key.len() as u32;
        let vlen = val.len() as u32;
        let offset = self.end() - klen - vlen;
        slots.insert(idx as usize, Slot::new(offset, klen, vlen, page));
        slots
            .into_iter()
            .enumerate()
            .for_each(|(idx, slot)| put_slot(&mut self.buf, idx as u32, &slot));
        put_size(&mut self.buf, size + 1);

        put_slice(&mut self.buf, offset as usize, key);
        put_slice(&mut self.buf, offset as usize + key.len(), val);
        Some(idx)
    }
}

impl Page for Block {
    fn reserve(cap: u32) -> Self {
        let mut buf = BytesMut::with_capacity(cap as usize);
        buf.extend_from_slice(&vec![0u8; cap as usize]);
        Self { buf }
    }

    fn create(id: u32, cap: u32, kind: Kind) -> Self {
        let mut buf = BytesMut::with_capacity(cap as usize);
        buf.put_u32(id);
        buf.put_u32(cap);
        buf.put_u32(0);
        buf.put_u16(MAGIC as u16);
        buf.put_u16(kind.tag());
        buf.put_u32(0);
        assert_eq!(buf.len(), HEAD);
        buf.extend_from_slice(&vec![0u8; cap as usize - HEAD]);
        Self { buf }
    }

    fn id(&self) -> u32 {
        get_u32(&self.buf, ID_OFFSET)
    }

    fn cap(&self) -> u32 {
        get_u32(&self.buf, CAP_OFFSET)
    }

    fn len(&self) -> u32 {
        get_u32(&self.buf, SIZE_OFFSET)
    }

    fn kind(&self) -> Option<Kind> {
        let tag = get_u32(&self.buf, KIND_OFFSET);
        if tag >> 16 != MAGIC {
            return None;
        }
        Kind::from_tag(tag as u16)
    }

    fn slot(&self, idx: u32) -> Option<Slot> {
        if idx >= self.len() {
            return None;
        }
        let pos = HEAD + SLOT * idx as usize;
        let offset = get_u32(&self.buf, pos);
        let klen = get_u32(&self.buf, pos + 4);
        let vlen = get_u32(&self.buf, pos + 8);
        let page = get_u32(&self.buf, pos + 12);
        Some(Slot::new(offset, klen, vlen, page))
    }

    fn key(&self, idx: u32) -> &[u8] {
        self.slot(idx)
            .map(|slot| get_key(&self.buf, &slot))
            .unwrap_or_default()
    }

    fn val(&self, idx: u32) -> &[u8] {
        self.slot(idx)
            .map(|slot| get_val(&self.buf, &slot))
            .unwrap_or_default()
    }

    fn max(&self) -> &[u8] {
        self.key(self.len().saturating_sub(1))
    }

    fn search(&self, key: &[u8], cmp: Comparator) -> Result<u32, u32> {
        bsearch(0, self.len(), |i| cmp.compare(key, self.key(i)))
    }

    fn find(&self, key: &[u8], cmp: Comparator) -> Option<u32> {
        self.search(key, cmp).ok()
    }

    fn ceil(&self, key: &[u8], cmp: Comparator) -> Option<u32> {
        match self.search(key, cmp) {
            Ok(idx) => Some(idx),
            Err(idx) if idx < self.len() => Some(idx),
            Err(_) => None,
        }
    }

    fn free(&self) -> u32 {
        let lo = HEAD as u32 + self.len() * SLOT as u32;
        let hi = self.end();
        assert!(lo <= hi);
        hi - lo
    }

    fn fits(&self, len: u32) -> bool {
        self.free() >= len + SLOT as u32
    }

    fn put_val(&mut self, key: &[u8], val: &[u8], page: u32, cmp: Comparator) -> Option<u32> {
        self.put_entry(key, val, page, cmp)
    }

    fn push(&mut self, key: &[u8], val: &[u8], page: u32) -> Option<u32> {
        if !self.fits((key.len() + val.len()) as u32) {
            return None;
        }
        let idx = self.len();
        let offset = self.end() - (key.len() + val.len()) as u32;
        put_slice(&mut self.buf, offset as usize, key);
        put_slice(&mut self.buf, offset as usize + key.len(), val);
        let slot = Slot::new(offset, key.len() as u32, val.len() as u32, page);
        put_slot(&mut self.buf, idx, &slot);
        put_size(&mut self.buf, idx + 1);
        Some(idx)
    }

    fn remove(&mut self, idx: u32) {
        let size = self.len();
        if idx >= size {
            return;
        }

        let mut slots = (0..size)
            .filter_map(|idx| self.slot(idx))
            .collect::<Vec<_>>();

        let removed = slots.remove(idx as usize);
        let blank = vec![0u8; (removed.klen + removed.vlen) as usize];
        put_slice(&mut self.buf, removed.offset as usize, &blank);

        put_size(&mut self.buf, size - 1);

        let total: u32 = slots.iter().map(|slot| slot.klen + slot.vlen).sum();
        let mut offset = self.cap() - total;

        let copy = slots
            .iter()
            .map(|slot| {
                (
                    get_key(&self.buf, slot).to_vec(),
                    get_val(&self.buf, slot).to_vec(),
                )
            })
            .collect::<Vec<_>>();

        for (i, (key, val)) in copy.iter().enumerate() {
            slots[i].offset = offset;
            put_slice(&mut self.buf, offset as usize, key);
            offset += key.len() as u32;
            put_slice(&mut self.buf, offset as usize, val);
            offset += val.len() as u32;
        }

        slots.push(Slot::empty());
        slots
            .into_iter()
            .enumerate()
            .for_each(|(idx, slot)| put_slot(&mut self.buf, idx as u32, &slot));
    }

    fn copy(&self) -> Vec<Entry> {
        (0..self.len())
            .filter_map(|idx| self.slot(idx))
            .map(|slot| {
                (
                    get_key(&self.buf, &slot).to_vec(),
                    get_val(&self.buf, &slot).to_vec(),
                    slot.page,
                )
            })
            .collect::<Vec<_>>()
    }

    fn clear(&mut self, kind: Kind) {
        let len = self.cap() as usize;
        let mut tmp = BytesMut::with_capacity(HEAD);
        tmp.put_u32(self.id());
        tmp.put_u32(self.cap());
        tmp.put_u32(0);
        tmp.put_u16(MAGIC as u16);
        tmp.put_u16(kind.tag());
        tmp.put_u32(0);
        self.buf[..HEAD].copy_from_slice(tmp.as_ref());
        let blank = vec![0u8; len - HEAD];
        self.buf[HEAD..].copy_from_slice(&blank);
    }

    fn seal(&mut self) {
        let crc = self.checksum();
        put_u32(&mut self.buf, CRC_OFFSET, crc);
    }

    fn verify(&self) -> bool {
        self.buf.len() >= HEAD
            && self.kind().is_some()
            && self.cap() as usize == self.buf.len()
            && get_u32(&self.buf, CRC_OFFSET) == self.checksum()
            && HEAD + self.len() as usize * SLOT <= self.buf.len()
    }
}

const U32: usize = size_of::<u32>();
pub(crate) const SLOT: usize = size_of::<Slot>();
pub(crate) const HEAD: usize = 5 * U32; // page header: id, capacity, size, magic & kind, checksum

fn get_u32(buf: &BytesMut, pos: usize) -> u32 {
    let mut src = [0u8; U32];
    src.copy_from_slice(&buf[pos..(pos + U32)]);
    u32::from_be_bytes(src)
}

fn get_key<'a>(buf: &'a BytesMut, slot: &Slot) -> &'a [u8] {
    &buf[(slot.offset as usize)..(slot.offset as usize + slot.klen as usize)]
}

fn get_val<'a>(buf: &'a BytesMut, slot: &Slot) -> &'a [u8] {
    &buf[(slot.offset as usize + slot.klen as usize)
        ..(slot.offset as usize + slot.klen as usize + slot.vlen as usize)]
}

fn put_u32(buf: &mut BytesMut, pos: usize, val: u32) {
    let dst = &mut buf[pos..(pos + U32)];
    dst.copy_from_slice(&val.to_be_bytes());
}

fn put_slice(buf: &mut BytesMut, pos: usize, src: &[u8]) {
    let dst = &mut buf[pos..(pos + src.len())];
    dst.copy_from_slice(src);
}

fn put_size(buf: &mut BytesMut, val: u32) {
    put_u32(buf, SIZE_OFFSET, val);
}

fn put_slot(buf: &mut BytesMut, idx: u32, slot: &Slot) {
    let pos = HEAD + idx as usize * SLOT;
    put_u32(buf, pos, slot.offset);
    put_u32(buf, pos + 4, slot.klen);
    put_u32(buf, pos + 8, slot.vlen);
    put_u32(buf, pos + 12, slot.page);
}
