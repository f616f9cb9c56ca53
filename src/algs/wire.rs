//! Fixed, versioned, little-endian wire types for synchronization messages.

use crate::algs::reconcile::IdRequest;
use crate::mesh_error::MeshError;
use crate::pedigree::PedigreePath;
use crate::topology::dimension::Dimension;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

// All multi-byte integers in these structs are little-endian on the wire. They are stored
// pre-converted with `.to_le()` and read back with `from_le`.

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// A resolved domain id.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireId {
    pub id_le: u64,
}

impl WireId {
    pub fn of(id: u64) -> Self {
        Self { id_le: id.to_le() }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.id_le)
    }
}

/// Header of one pedigree request; `word_count` packed `u32` words follow it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WirePedigreeHeader {
    pub root_le: u64,
    pub slot_le: u32,
    pub level_le: u16,
    pub word_count_le: u16,
}

impl WirePedigreeHeader {
    pub fn new(path: &PedigreePath, slot: u32) -> Self {
        Self {
            root_le: path.root_domain_id().to_le(),
            slot_le: slot.to_le(),
            level_le: (path.level() as u16).to_le(),
            word_count_le: (path.words().len() as u16).to_le(),
        }
    }
    pub fn root(&self) -> u64 {
        u64::from_le(self.root_le)
    }
    pub fn slot(&self) -> u32 {
        u32::from_le(self.slot_le)
    }
    pub fn level(&self) -> u16 {
        u16::from_le(self.level_le)
    }
    pub fn word_count(&self) -> usize {
        u16::from_le(self.word_count_le) as usize
    }
}

/// Leading record of every request stream.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireStreamHeader {
    pub version_le: u16,
    pub reserved_le: u16,
    pub count_le: u32,
}

impl WireStreamHeader {
    pub fn new(count: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            reserved_le: 0,
            count_le: (count as u32).to_le(),
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }
}

const _: () = {
    assert!(size_of::<WireCount>() == 4);
    assert!(size_of::<WireId>() == 8);
    assert!(size_of::<WirePedigreeHeader>() == 16);
    assert!(size_of::<WireStreamHeader>() == 8);
};

/// Serializes requests as a stream header followed by `(header, words)` records.
pub fn encode_requests(requests: &[IdRequest]) -> Vec<u8> {
    let words: usize = requests.iter().map(|r| r.path.words().len()).sum();
    let mut out = Vec::with_capacity(
        size_of::<WireStreamHeader>()
            + requests.len() * size_of::<WirePedigreeHeader>()
            + words * size_of::<u32>(),
    );
    out.extend_from_slice(bytemuck::bytes_of(&WireStreamHeader::new(requests.len())));
    for r in requests {
        out.extend_from_slice(bytemuck::bytes_of(&WirePedigreeHeader::new(&r.path, r.slot)));
        for &w in r.path.words() {
            out.extend_from_slice(&w.to_le_bytes());
        }
    }
    out
}

fn take<'a>(bytes: &mut &'a [u8], n: usize) -> Result<&'a [u8], MeshError> {
    if bytes.len() < n {
        return Err(MeshError::MalformedPedigree(format!(
            "truncated request stream: need {n} bytes, {} left",
            bytes.len()
        )));
    }
    let (head, rest) = bytes.split_at(n);
    *bytes = rest;
    Ok(head)
}

/// Inverse of [`encode_requests`]. Records may sit at any alignment inside the stream.
pub fn decode_requests(mut bytes: &[u8], dim: Dimension) -> Result<Vec<IdRequest>, MeshError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let hdr: WireStreamHeader =
        bytemuck::pod_read_unaligned(take(&mut bytes, size_of::<WireStreamHeader>())?);
    if hdr.version() != WIRE_VERSION {
        return Err(MeshError::MalformedPedigree(format!(
            "wire version {} (expected {WIRE_VERSION})",
            hdr.version()
        )));
    }
    let mut out = Vec::with_capacity(hdr.count());
    for _ in 0..hdr.count() {
        let h: WirePedigreeHeader =
            bytemuck::pod_read_unaligned(take(&mut bytes, size_of::<WirePedigreeHeader>())?);
        let raw = take(&mut bytes, h.word_count() * size_of::<u32>())?;
        let words: Vec<u32> = raw
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let level = u8::try_from(h.level())
            .map_err(|_| MeshError::MalformedPedigree(format!("level {} too deep", h.level())))?;
        let path = PedigreePath::from_parts(h.root(), level, &words, dim)?;
        out.push(IdRequest {
            path,
            slot: h.slot(),
        });
    }
    if !bytes.is_empty() {
        return Err(MeshError::MalformedPedigree(format!(
            "{} trailing bytes after {} requests",
            bytes.len(),
            hdr.count()
        )));
    }
    Ok(out)
}

pub fn encode_ids(ids: &[u64]) -> Vec<u8> {
    let wire: Vec<WireId> = ids.iter().map(|&id| WireId::of(id)).collect();
    cast_slice(&wire).to_vec()
}

pub fn decode_ids(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(size_of::<WireId>())
        .map(|c| bytemuck::pod_read_unaligned::<WireId>(c).get())
        .collect()
}
