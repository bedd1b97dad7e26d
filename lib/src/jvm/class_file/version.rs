use super::{Deserialize, Serialize};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java 1.1 (oldest format with the current layout)
    pub const JAVA1_1: Version = Version {
        major_version: 45,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 6 (first to carry stack map frames)
    pub const JAVA6: Version = Version {
        major_version: 50,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        major_version: 52,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 17 (released September 2021)
    pub const JAVA17: Version = Version {
        major_version: 61,
        minor_version: 0,
    };

    /// Can the decoder handle every structure this version may contain?
    ///
    /// Newer versions may use constant pool tags or attributes whose layout we do not know.
    pub fn is_supported(&self) -> bool {
        Version::JAVA1_1.major_version <= self.major_version
            && self.major_version <= Version::JAVA17.major_version
    }

    /// Does the JVM type-check methods of this class using `StackMapTable` frames?
    pub fn uses_stack_map_frames(&self) -> bool {
        self.major_version >= Version::JAVA6.major_version
    }
}

/// Class files store the minor version first
impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Version {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let minor_version = u16::deserialize(reader)?;
        let major_version = u16::deserialize(reader)?;
        Ok(Version {
            major_version,
            minor_version,
        })
    }
}
