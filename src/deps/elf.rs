//! Dynamic section inspection

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use goblin::Object;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// What the dynamic linker needs to know about one ELF file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfInfo {
    /// Path of the file
    pub path: PathBuf,
    /// `e_machine` from the header
    pub machine: u16,
    /// Whether the file is a shared object rather than an executable
    pub is_shared_object: bool,
    /// `DT_NEEDED` entries
    pub needed: Vec<String>,
    /// `DT_SONAME`, if any
    pub soname: Option<String>,
    /// Whether a `PT_INTERP` program header is present
    pub has_interpreter: bool,
}

/// Cheap check of the first four bytes
pub fn has_elf_magic(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|_| magic == ELF_MAGIC)
        .unwrap_or(false)
}

/// Parse an ELF file; `Ok(None)` for anything that is not ELF
pub fn read_elf_info(path: &Path) -> Result<Option<ElfInfo>, goblin::error::Error> {
    let data = fs::read(path).map_err(goblin::error::Error::IO)?;
    if data.len() < 4 || data[..4] != ELF_MAGIC {
        return Ok(None);
    }

    let elf = match Object::parse(&data)? {
        Object::Elf(elf) => elf,
        _ => return Ok(None),
    };

    Ok(Some(ElfInfo {
        path: path.to_path_buf(),
        machine: elf.header.e_machine,
        is_shared_object: elf.header.e_type == goblin::elf::header::ET_DYN
            && elf.interpreter.is_none(),
        needed: elf.libraries.iter().map(|lib| lib.to_string()).collect(),
        soname: elf.soname.map(|s| s.to_string()),
        has_interpreter: elf.interpreter.is_some(),
    }))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Minimal ELF64 little-endian images with a dynamic section

    /// ELF64 with `PT_DYNAMIC` listing the given `DT_NEEDED` entries and optional `DT_SONAME`
    pub fn build_elf(machine: u16, needed: &[&str], soname: Option<&str>, shared: bool) -> Vec<u8> {
        const EHDR: usize = 64;
        const PHDR: usize = 56;
        let phnum = 2usize;

        let mut strtab = vec![0u8];
        let mut offsets = Vec::new();
        for name in needed.iter().copied().chain(soname) {
            offsets.push(strtab.len() as u64);
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }

        let strtab_off = EHDR + PHDR * phnum;
        let dyn_off = (strtab_off + strtab.len() + 7) & !7;
        let mut dynamic: Vec<(u64, u64)> = Vec::new();
        for offset in offsets.iter().take(needed.len()) {
            dynamic.push((1, *offset)); // DT_NEEDED
        }
        if soname.is_some() {
            dynamic.push((14, offsets[needed.len()])); // DT_SONAME
        }
        dynamic.push((5, strtab_off as u64)); // DT_STRTAB
        dynamic.push((10, strtab.len() as u64)); // DT_STRSZ
        dynamic.push((0, 0)); // DT_NULL
        let dyn_size = dynamic.len() * 16;
        let total = dyn_off + dyn_size;

        let mut out = vec![0u8; total];
        out[..4].copy_from_slice(b"\x7fELF");
        out[4] = 2; // ELFCLASS64
        out[5] = 1; // ELFDATA2LSB
        out[6] = 1; // EV_CURRENT
        let e_type: u16 = if shared { 3 } else { 2 };
        out[16..18].copy_from_slice(&e_type.to_le_bytes());
        out[18..20].copy_from_slice(&machine.to_le_bytes());
        out[20..24].copy_from_slice(&1u32.to_le_bytes());
        out[32..40].copy_from_slice(&(EHDR as u64).to_le_bytes()); // e_phoff
        out[52..54].copy_from_slice(&(EHDR as u16).to_le_bytes()); // e_ehsize
        out[54..56].copy_from_slice(&(PHDR as u16).to_le_bytes()); // e_phentsize
        out[56..58].copy_from_slice(&(phnum as u16).to_le_bytes()); // e_phnum

        // PT_LOAD covering the whole file so vaddr == offset
        let load = EHDR;
        out[load..load + 4].copy_from_slice(&1u32.to_le_bytes());
        out[load + 4..load + 8].copy_from_slice(&4u32.to_le_bytes()); // PF_R
        out[load + 32..load + 40].copy_from_slice(&(total as u64).to_le_bytes());
        out[load + 40..load + 48].copy_from_slice(&(total as u64).to_le_bytes());
        out[load + 48..load + 56].copy_from_slice(&0x1000u64.to_le_bytes());

        // PT_DYNAMIC
        let dynamic_ph = EHDR + PHDR;
        out[dynamic_ph..dynamic_ph + 4].copy_from_slice(&2u32.to_le_bytes());
        out[dynamic_ph + 4..dynamic_ph + 8].copy_from_slice(&4u32.to_le_bytes());
        for field in [8, 16, 24] {
            // p_offset, p_vaddr, p_paddr
            out[dynamic_ph + field..dynamic_ph + field + 8]
                .copy_from_slice(&(dyn_off as u64).to_le_bytes());
        }
        out[dynamic_ph + 32..dynamic_ph + 40].copy_from_slice(&(dyn_size as u64).to_le_bytes());
        out[dynamic_ph + 40..dynamic_ph + 48].copy_from_slice(&(dyn_size as u64).to_le_bytes());
        out[dynamic_ph + 48..dynamic_ph + 56].copy_from_slice(&8u64.to_le_bytes());

        out[strtab_off..strtab_off + strtab.len()].copy_from_slice(&strtab);
        for (i, (tag, value)) in dynamic.iter().enumerate() {
            let at = dyn_off + i * 16;
            out[at..at + 8].copy_from_slice(&tag.to_le_bytes());
            out[at + 8..at + 16].copy_from_slice(&value.to_le_bytes());
        }

        out
    }
}
