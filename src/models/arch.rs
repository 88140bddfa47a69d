//! Build architecture handling

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use goblin::elf::header::{EM_386, EM_AARCH64, EM_ARM, EM_X86_64};

use crate::error::{ConvertError, Result};

/// RPM build architecture of the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    /// x86_64 / amd64
    X86_64,
    /// i686 / i386
    I686,
    /// aarch64 / arm64
    Aarch64,
    /// armv7hl / armhf
    Armv7hl,
    /// Architecture independent
    Noarch,
}

impl Architecture {
    /// Map an ELF `e_machine` value to an RPM architecture
    pub fn from_elf_machine(machine: u16) -> Option<Self> {
        match machine {
            EM_X86_64 => Some(Self::X86_64),
            EM_386 => Some(Self::I686),
            EM_AARCH64 => Some(Self::Aarch64),
            EM_ARM => Some(Self::Armv7hl),
            _ => None,
        }
    }

    /// Get the RPM `BuildArch` name
    pub fn to_rpm_name(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::I686 => "i686",
            Self::Aarch64 => "aarch64",
            Self::Armv7hl => "armv7hl",
            Self::Noarch => "noarch",
        }
    }

    /// Suffix rpm uses for 64-bit automatic library provides
    pub fn lib_provides_suffix(&self) -> &'static str {
        match self {
            Self::X86_64 => "()(64bit)",
            Self::Aarch64 => "()(64bit)",
            _ => "",
        }
    }

    /// Get the current system architecture
    pub fn current() -> Self {
        #[cfg(target_arch = "x86_64")]
        return Self::X86_64;
        #[cfg(target_arch = "x86")]
        return Self::I686;
        #[cfg(target_arch = "aarch64")]
        return Self::Aarch64;
        #[cfg(target_arch = "arm")]
        return Self::Armv7hl;
        #[cfg(not(any(
            target_arch = "x86_64",
            target_arch = "x86",
            target_arch = "aarch64",
            target_arch = "arm"
        )))]
        return Self::X86_64;
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rpm_name())
    }
}

impl FromStr for Architecture {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "x86_64" | "amd64" => Ok(Self::X86_64),
            "i686" | "i386" => Ok(Self::I686),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            "armv7hl" | "armhf" | "armv7l" => Ok(Self::Armv7hl),
            "noarch" | "any" | "all" => Ok(Self::Noarch),
            _ => Err(ConvertError::InvalidInput(format!(
                "Unknown architecture: {}",
                s
            ))),
        }
    }
}

impl Default for Architecture {
    fn default() -> Self {
        Self::X86_64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elf_machine_mapping() {
        assert_eq!(Architecture::from_elf_machine(EM_X86_64), Some(Architecture::X86_64));
        assert_eq!(Architecture::from_elf_machine(EM_AARCH64), Some(Architecture::Aarch64));
        assert_eq!(Architecture::from_elf_machine(0xffff), None);
    }

    #[test]
    fn test_rpm_names() {
        assert_eq!(Architecture::X86_64.to_rpm_name(), "x86_64");
        assert_eq!(Architecture::Armv7hl.to_rpm_name(), "armv7hl");
        assert_eq!("arm64".parse::<Architecture>().unwrap(), Architecture::Aarch64);
        assert!("sparc".parse::<Architecture>().is_err());
    }
}
