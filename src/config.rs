use crate::error::{Error, Result};
use crate::pool::Partition;
use crate::MB;
use clap::{Parser, ValueEnum};
use std::env;
use std::str::FromStr;

/// How a victim frame is chosen when a swap-in finds physical memory full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EvictionKind {
    First,
    Random,
}

impl FromStr for EvictionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(EvictionKind::First),
            "random" => Ok(EvictionKind::Random),
            other => Err(Error::InvalidInput(format!(
                "unknown eviction policy '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for EvictionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionKind::First => f.write_str("first"),
            EvictionKind::Random => f.write_str("random"),
        }
    }
}

/// Sizing of every simulated resource. All memory sizes are in MB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub page_size: u64,
    pub physical_memory: u64,
    pub kernel_memory: u64,
    pub system_memory: u64,
    pub logical_pages: usize,
    pub disk_blocks: usize,
    pub disk_block_size: u64,
    pub tlb_size: usize,
    pub logical_space: bool,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            page_size: 4,
            physical_memory: 1024,
            kernel_memory: 128,
            system_memory: 64,
            logical_pages: 1024,
            disk_blocks: 100,
            disk_block_size: 20,
            tlb_size: 8,
            logical_space: true,
        }
    }
}

impl Geometry {
    pub fn page_bytes(&self) -> u64 {
        self.page_size * MB
    }

    pub fn physical_partition(&self) -> Partition {
        Partition {
            block_size: self.page_size,
            total_blocks: (self.physical_memory / self.page_size) as usize,
            kernel_blocks: (self.kernel_memory / self.page_size) as usize,
            system_blocks: (self.system_memory / self.page_size) as usize,
        }
    }

    /// The logical space mirrors the reserved regions of physical memory and extends past it.
    pub fn logical_partition(&self) -> Partition {
        Partition {
            total_blocks: self.logical_pages,
            ..self.physical_partition()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> { Err(Error::InvalidInput(String::from(msg))) };

        if !self.page_size.is_power_of_two() {
            return invalid("'page_size' must be a non-zero power of 2 integer value");
        }
        if self.physical_memory == 0 || self.physical_memory % self.page_size != 0 {
            return invalid("'physical_memory' must be a non-zero multiple of 'page_size'");
        }
        if self.kernel_memory % self.page_size != 0 || self.system_memory % self.page_size != 0 {
            return invalid("'kernel_memory' and 'system_memory' must be multiples of 'page_size'");
        }
        if self.kernel_memory + self.system_memory >= self.physical_memory {
            return invalid("reserved kernel and system memory must leave free physical memory");
        }
        if self.logical_space
            && self.logical_pages <= self.logical_partition().reserved_blocks()
        {
            return invalid("'logical_pages' must exceed the reserved kernel and system pages");
        }
        if self.tlb_size == 0 {
            return invalid("'tlb_size' must be a non-zero value");
        }
        if self.disk_blocks == 0 || self.disk_block_size == 0 {
            return invalid("'disk_blocks' and 'disk_block_size' must be non-zero values");
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Page size in MB.
    #[arg(long, default_value_t = env_or_default::<u64>("SIM_PAGE_SIZE", 4))]
    pub page_size: u64,

    /// Physical memory in MB.
    #[arg(long, default_value_t = env_or_default::<u64>("SIM_PHYSICAL_MEMORY", 1024))]
    pub physical_memory: u64,

    #[arg(long, default_value_t = env_or_default::<u64>("SIM_KERNEL_MEMORY", 128))]
    pub kernel_memory: u64,

    #[arg(long, default_value_t = env_or_default::<u64>("SIM_SYSTEM_MEMORY", 64))]
    pub system_memory: u64,

    /// Size of the logical address space in pages.
    #[arg(long, default_value_t = env_or_default::<usize>("SIM_LOGICAL_PAGES", 1024))]
    pub logical_pages: usize,

    #[arg(long, default_value_t = env_or_default::<usize>("SIM_DISK_BLOCKS", 100))]
    pub disk_blocks: usize,

    /// Swap block size in MB.
    #[arg(long, default_value_t = env_or_default::<u64>("SIM_DISK_BLOCK_SIZE", 20))]
    pub disk_block_size: u64,

    #[arg(long, default_value_t = env_or_default::<usize>("SIM_TLB_SIZE", 8))]
    pub tlb_size: usize,

    /// Map virtual pages straight onto physical frames instead of a separate logical space.
    #[arg(long, default_value_t = env_or_default("SIM_NO_LOGICAL_SPACE", false))]
    pub no_logical_space: bool,

    #[arg(long, value_enum, default_value_t = env_or_default("SIM_EVICTION", EvictionKind::First))]
    pub eviction: EvictionKind,

    /// Seed for the random eviction policy.
    #[arg(long, env = "SIM_SEED")]
    pub seed: Option<u64>,

    /// Operation script to replay. Commands are read from stdin when omitted.
    #[arg(long, env = "SIM_SCRIPT")]
    pub script: Option<String>,

    /// Print the backend JSON messages after every operation.
    #[arg(long, default_value_t = env_or_default("SIM_JSON", false))]
    pub json: bool,
}

impl Config {
    pub fn geometry(&self) -> Geometry {
        Geometry {
            page_size: self.page_size,
            physical_memory: self.physical_memory,
            kernel_memory: self.kernel_memory,
            system_memory: self.system_memory,
            logical_pages: self.logical_pages,
            disk_blocks: self.disk_blocks,
            disk_block_size: self.disk_block_size,
            tlb_size: self.tlb_size,
            logical_space: !self.no_logical_space,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.geometry().validate()
    }

    pub fn display(&self) {
        println!("simulation configuration values: ");
        println!("{:#?}", self);
    }
}

fn env_or_default<T: FromStr>(varname: &str, default: T) -> T {
    match env::var(varname) {
        Ok(val) => val.parse().unwrap_or_else(|_| {
            eprintln!("ignoring unparsable value '{}' for env var '{}'", val, varname);
            default
        }),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(test)]
    mod geometry_tests {
        use super::*;

        #[test]
        fn default_is_valid() {
            let geometry = Geometry::default();
            assert!(geometry.validate().is_ok());
            assert_eq!(geometry.page_bytes(), 4 * 1024 * 1024);
        }

        #[test]
        fn partitions() {
            let geometry = Geometry::default();
            let physical = geometry.physical_partition();
            assert_eq!(physical.total_blocks, 256);
            assert_eq!(physical.kernel_blocks, 32);
            assert_eq!(physical.system_blocks, 16);

            let logical = geometry.logical_partition();
            assert_eq!(logical.total_blocks, 1024);
            assert_eq!(logical.reserved_blocks(), 48);
        }

        #[test]
        fn rejects_bad_values() {
            let cases = [
                Geometry {
                    page_size: 3,
                    ..Geometry::default()
                },
                Geometry {
                    kernel_memory: 130,
                    ..Geometry::default()
                },
                Geometry {
                    kernel_memory: 1000,
                    ..Geometry::default()
                },
                Geometry {
                    logical_pages: 48,
                    ..Geometry::default()
                },
                Geometry {
                    tlb_size: 0,
                    ..Geometry::default()
                },
                Geometry {
                    disk_blocks: 0,
                    ..Geometry::default()
                },
            ];
            cases
                .iter()
                .for_each(|geometry| assert!(geometry.validate().is_err(), "{:?}", geometry));
        }
    }

    #[cfg(test)]
    mod config_tests {
        use super::*;

        #[test]
        fn parse_flags() {
            let config = Config::parse_from([
                "memsim",
                "--page-size",
                "8",
                "--tlb-size",
                "4",
                "--eviction",
                "random",
                "--seed",
                "42",
                "--no-logical-space",
            ]);
            assert_eq!(config.page_size, 8);
            assert_eq!(config.eviction, EvictionKind::Random);
            assert_eq!(config.seed, Some(42));

            let geometry = config.geometry();
            assert!(!geometry.logical_space);
            assert_eq!(geometry.tlb_size, 4);
        }

        #[test]
        fn eviction_from_str() {
            assert_eq!("Random".parse::<EvictionKind>().unwrap(), EvictionKind::Random);
            assert!("lru".parse::<EvictionKind>().is_err());
        }
    }
}
