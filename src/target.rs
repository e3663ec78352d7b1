//! The catalog of reverse-engineered targets.
//!
//! Each record keys on the absolute address of the aboot signature-check
//! function as found by the scanner, and carries the bootloader-header
//! address the relocated ramdisk pointer must land on. The table is data,
//! not code: the builtin set below can be replaced wholesale by loading a
//! TOML catalog, so new firmware builds are a data drop, not a code change.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// One cataloged device/firmware build.
#[derive(Debug, Clone, Deserialize)]
pub struct Target {
    pub vendor: String,
    pub device: String,
    pub build: String,
    /// Absolute address of the signature-check function; the lookup key.
    pub check_sigs: u32,
    /// Address inside the aboot header that the patched image's relocated
    /// ramdisk pointer is engineered to land on.
    pub hdr: u32,
    /// LG-family targets reserve a full flash page instead of 512 bytes.
    #[serde(default)]
    pub lg: bool,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "target")]
    targets: Vec<Target>,
}

/// Read-only target registry. Lookup is an exact-match linear scan; the
/// table never exceeds a couple dozen entries.
#[derive(Debug, Clone)]
pub struct TargetCatalog {
    targets: Vec<Target>,
}

// vendor, device, build, check_sigs, hdr, lg
const BUILTIN: &[(&str, &str, &str, u32, u32, bool)] = &[
    ("AT&T", "Samsung Galaxy S4", "JDQ39.I337UCUAMDB or JDQ39.I337UCUAMDL", 0x88e0ff98, 0x88f3bafc, false),
    ("Verizon", "Samsung Galaxy S4", "JDQ39.I545VRUAMDK", 0x88e0fe98, 0x88f372fc, false),
    ("DoCoMo", "Samsung Galaxy S4", "JDQ39.SC04EOMUAMDI", 0x88e0fcd8, 0x88f0b2fc, false),
    ("Verizon", "Samsung Galaxy Stellar", "IMM76D.I200VRALH2", 0x88e0f5c0, 0x88ed32e0, false),
    ("Verizon", "Samsung Galaxy Stellar", "JZO54K.I200VRBMA1", 0x88e101ac, 0x88ed72e0, false),
    ("DoCoMo", "LG Optimus G", "L01E20b", 0x88f10e48, 0x88f54418, true),
    ("AT&T or HK", "LG Optimus G Pro", "E98010g or E98810b", 0x88f11084, 0x88f54418, true),
    ("KT, LGU, or SKT", "LG Optimus G Pro", "F240K10o, F240L10v, or F240S10w", 0x88f110b8, 0x88f54418, true),
    ("KT, LGU, or SKT", "LG Optimus LTE 2", "F160K20g, F160L20f, F160LV20d, or F160S20f", 0x88f10864, 0x88f802b8, true),
    ("MetroPCS", "LG Spirit", "MS87010a_05", 0x88f0e634, 0x88f68194, true),
    ("MetroPCS", "LG Motion", "MS77010f_01", 0x88f1015c, 0x88f58194, true),
    ("Verizon", "LG Lucid 2", "VS87010B_12", 0x88f10adc, 0x88f702bc, true),
    ("Verizon", "LG Spectrum 2", "VS93021B_05", 0x88f10c10, 0x88f84514, true),
    ("Boost Mobile", "LG Optimus F7", "LG870ZV4_06", 0x88f11714, 0x88f842ac, true),
    ("Virgin Mobile", "LG Optimus F3", "LS720ZV5", 0x88f108f0, 0x88f854f4, true),
    ("T-Mobile", "LG Optimus F3", "LS720ZV5", 0x88f10264, 0x88f64508, true),
    ("AT&T", "LG G2", "D80010d", 0x0f8132ac, 0x0f906440, true),
    ("Verizon", "LG G2", "VS98010b", 0x0f8131f0, 0x0f906440, true),
    ("T-Mobile", "LG G2", "D80110c", 0x0f813294, 0x0f906440, true),
    ("Sprint", "LG G2", "LS980ZV7", 0x0f813460, 0x0f9041c0, true),
    ("KT, LGU, or SKT", "LG G2", "F320K, F320L, F320S", 0x0f81346c, 0x0f8de440, true),
];

impl TargetCatalog {
    /// The builtin table of known devices.
    pub fn builtin() -> Self {
        let targets = BUILTIN
            .iter()
            .map(|&(vendor, device, build, check_sigs, hdr, lg)| Target {
                vendor: vendor.to_owned(),
                device: device.to_owned(),
                build: build.to_owned(),
                check_sigs,
                hdr,
                lg,
            })
            .collect();
        TargetCatalog { targets }
    }

    pub fn from_targets(targets: Vec<Target>) -> Self {
        TargetCatalog { targets }
    }

    /// Parse a catalog from TOML: a sequence of `[[target]]` tables with
    /// the same field names as [`Target`].
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(s)?;
        Ok(TargetCatalog {
            targets: file.targets,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)
            .map_err(|e| Error::io("read", path.display().to_string(), e))?;
        Self::from_toml_str(&s)
    }

    /// Resolve a scanned signature-check address to a target.
    pub fn lookup(&self, address: u32) -> Option<&Target> {
        self.targets.iter().find(|t| t.check_sigs == address)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
