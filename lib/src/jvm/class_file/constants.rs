use super::{read_bytes, Attribute, AttributeLike, Deserialize, Serialize};
use crate::jvm::{BinaryName, Error, RefType};
use crate::util::Width;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::Cursor;

/// Constant pool of a class file
///
/// The pool is append-only: entries read from the class file keep their indices (so that every
/// reference in untouched method bodies and attributes stays valid) and their exact original
/// encoding. New entries requested while patching are deduplicated against existing ones and
/// appended at the end.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    /// Entries indexed by constant index (index 0 and the slots after wide constants are `None`)
    entries: Vec<Option<Constant>>,

    /// Encoding of the entries that were read from the class file
    original_bytes: Vec<u8>,

    /// Number of slots (including the unused slot 0) covered by `original_bytes`
    original_len: usize,

    /// Reverse lookup from constant to index, built the first time a constant is inserted
    lookup: Option<HashMap<ConstantKey, ConstantIndex>>,
}

/// Reference to a field or method, as read from the constant pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_interface: bool,
}

impl ConstantPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantPool {
        ConstantPool {
            entries: vec![None],
            original_bytes: vec![],
            original_len: 1,
            lookup: None,
        }
    }

    /// Parse the constant pool (including the leading count)
    ///
    /// This takes a cursor rather than any reader so the raw bytes of the entries can be kept.
    pub fn parse(reader: &mut Cursor<&[u8]>) -> Result<ConstantPool, Error> {
        let count = u16::deserialize(reader)? as usize;
        let start = reader.position() as usize;
        let mut entries: Vec<Option<Constant>> = Vec::with_capacity(count);
        entries.push(None);

        while entries.len() < count {
            let constant = Constant::deserialize(reader)?;
            let width = constant.width();
            entries.push(Some(constant));
            if width == 2 {
                entries.push(None);
            }
        }
        if entries.len() != count {
            return Err(Error::MalformedClass(String::from(
                "wide constant overruns the constant pool",
            )));
        }

        let end = reader.position() as usize;
        let original_bytes = reader.get_ref()[start..end].to_vec();
        Ok(ConstantPool {
            entries,
            original_bytes,
            original_len: count,
            lookup: None,
        })
    }

    /// Number of slots in the pool (this is `constant_pool_count` in the class file)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of slots that were read from the class file
    pub fn original_len(&self) -> usize {
        self.original_len
    }

    /// Look up any constant
    pub fn constant(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        self.entries
            .get(index.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidConstantIndex(index.0))
    }

    fn unexpected(index: impl Into<ConstantIndex>, expected: &'static str) -> Error {
        Error::UnexpectedConstant {
            index: index.into().0,
            expected,
        }
    }

    /// Look up a `CONSTANT_Utf8` entry
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.constant(index.0)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(Self::unexpected(index, "Utf8")),
        }
    }

    /// Look up the name of a `CONSTANT_Class` entry
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.constant(index.0)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(Self::unexpected(index, "Class")),
        }
    }

    /// Look up a `CONSTANT_Class` entry as a reference type
    pub fn class_type(&self, index: ClassConstantIndex) -> Result<RefType<BinaryName>, Error> {
        let name = self.class_name(index)?;
        RefType::from_class_name(name).map_err(|err| Error::BadDescriptor(err.to_string()))
    }

    /// Look up a `CONSTANT_NameAndType` entry
    pub fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Result<(&str, &str), Error> {
        match self.constant(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Self::unexpected(index, "NameAndType")),
        }
    }

    /// Look up a `CONSTANT_Fieldref`, `CONSTANT_Methodref`, or `CONSTANT_InterfaceMethodref`
    pub fn member(&self, index: ConstantIndex) -> Result<MemberRef<'_>, Error> {
        let (class, name_and_type, is_interface) = match self.constant(index)? {
            Constant::FieldRef(class, name_and_type) => (*class, *name_and_type, false),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => (*class, *name_and_type, *is_interface),
            _ => return Err(Self::unexpected(index, "Fieldref or Methodref")),
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name(class)?,
            name,
            descriptor,
            is_interface,
        })
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let offset = self.entries.len();
        if offset + constant.width() > u16::MAX as usize {
            return Err(ConstantPoolOverflow { constant, offset });
        }

        let width = constant.width();
        self.entries.push(Some(constant));
        if width == 2 {
            self.entries.push(None);
        }
        Ok(ConstantIndex(offset as u16))
    }

    /// Get or insert a constant
    fn get_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if self.lookup.is_none() {
            let mut lookup = HashMap::new();
            for (idx, entry) in self.entries.iter().enumerate() {
                if let Some(entry) = entry {
                    lookup
                        .entry(ConstantKey::from(entry))
                        .or_insert(ConstantIndex(idx as u16));
                }
            }
            self.lookup = Some(lookup);
        }

        let key = ConstantKey::from(&constant);
        if let Some(idx) = self.lookup.as_ref().and_then(|lookup| lookup.get(&key)) {
            return Ok(*idx);
        }
        let idx = self.push_constant(constant)?;
        if let Some(lookup) = self.lookup.as_mut() {
            lookup.insert(key, idx);
        }
        Ok(idx)
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8(
        &mut self,
        utf8: impl Into<String>,
    ) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        self.get_constant(Constant::Utf8(utf8.into()))
            .map(Utf8ConstantIndex)
    }

    /// Get or insert a class constant (array classes are named by their descriptor)
    pub fn get_class(
        &mut self,
        class: &RefType<BinaryName>,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        let name = self.get_utf8(class.class_name())?;
        self.get_constant(Constant::Class(name))
            .map(ClassConstantIndex)
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(
        &mut self,
        string: impl Into<String>,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let utf8 = self.get_utf8(string)?;
        self.get_constant(Constant::String(utf8))
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        self.get_constant(Constant::NameAndType { name, descriptor })
            .map(NameAndTypeConstantIndex)
    }

    /// Get or insert a field reference
    pub fn get_field_ref(
        &mut self,
        owner: &BinaryName,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let class = self.get_class(&RefType::Object(owner.clone()))?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.get_constant(Constant::FieldRef(class, name_and_type))
    }

    /// Get or insert a method reference (`Methodref` or `InterfaceMethodref`)
    pub fn get_method_ref(
        &mut self,
        owner: &RefType<BinaryName>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        is_interface: bool,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.get_constant(Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        })
    }

    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        self.get_constant(Constant::Integer(integer))
    }

    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        self.get_constant(Constant::Float(float))
    }

    pub fn get_long(&mut self, long: i64) -> Result<ConstantIndex, ConstantPoolOverflow> {
        self.get_constant(Constant::Long(long))
    }

    pub fn get_double(&mut self, double: f64) -> Result<ConstantIndex, ConstantPoolOverflow> {
        self.get_constant(Constant::Double(double))
    }

    /// Get or insert a method type constant
    pub fn get_method_type(
        &mut self,
        descriptor: impl Into<String>,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let descriptor = self.get_utf8(descriptor)?;
        self.get_constant(Constant::MethodType { descriptor })
    }

    /// Get or insert an invoke dynamic constant from the constant pool
    pub fn get_invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let method_descriptor = self.get_name_and_type(name, descriptor)?;
        self.get_constant(Constant::InvokeDynamic {
            bootstrap_method,
            method_descriptor,
        })
    }

    /// Encode an attribute, adding its name to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];
        attribute.serialize(&mut info).map_err(Error::IoError)?;
        Ok(Attribute { name_index, info })
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.entries.len() as u16).serialize(writer)?;
        writer.write_all(&self.original_bytes)?;
        for constant in self.entries[self.original_len..].iter().flatten() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: usize,
}

impl From<ConstantPoolOverflow> for Error {
    fn from(overflow: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow {
            constant: overflow.constant,
            offset: overflow.offset,
        }
    }
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    /// Module (only in `module-info` classes)
    Module(Utf8ConstantIndex),

    /// Package exported or opened by a module
    Package(Utf8ConstantIndex),
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for Constant {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let constant = match u8::deserialize(reader)? {
            1 => {
                let len = u16::deserialize(reader)?;
                let bytes = read_bytes(reader, len as usize)?;
                Constant::Utf8(decode_modified_utf8(&bytes))
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            tag @ (10 | 11) => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                method_descriptor: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Unknown constant pool tag {}", other),
                ))
            }
        };
        Ok(constant)
    }
}

/// Hashable identity of a constant, used to deduplicate insertions
#[derive(Hash, PartialEq, Eq, Debug, Clone)]
enum ConstantKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16, bool),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
}

impl From<&Constant> for ConstantKey {
    fn from(constant: &Constant) -> ConstantKey {
        match constant {
            Constant::Utf8(string) => ConstantKey::Utf8(string.clone()),
            Constant::Integer(integer) => ConstantKey::Integer(*integer),
            Constant::Float(float) => ConstantKey::Float(float.to_bits()),
            Constant::Long(long) => ConstantKey::Long(*long),
            Constant::Double(double) => ConstantKey::Double(double.to_bits()),
            Constant::Class(name) => ConstantKey::Class((name.0).0),
            Constant::String(utf8) => ConstantKey::String((utf8.0).0),
            Constant::FieldRef(class, name_and_type) => {
                ConstantKey::FieldRef((class.0).0, (name_and_type.0).0)
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => ConstantKey::MethodRef((class.0).0, (name_and_type.0).0, *is_interface),
            Constant::NameAndType { name, descriptor } => {
                ConstantKey::NameAndType((name.0).0, (descriptor.0).0)
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => ConstantKey::MethodHandle(handle_kind.tag(), member.0),
            Constant::MethodType { descriptor } => ConstantKey::MethodType((descriptor.0).0),
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => ConstantKey::Dynamic(*bootstrap_method, (name_and_type.0).0),
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => ConstantKey::InvokeDynamic(*bootstrap_method, (method_descriptor.0).0),
            Constant::Module(name) => ConstantKey::Module((name.0).0),
            Constant::Package(name) => ConstantKey::Package((name.0).0),
        }
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x1F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Modified UTF-8 is an encoding of UTF-16 code units, so the bytes are first decoded to code
/// units and the code units are then joined (which also pairs up surrogates). Malformed bytes and
/// unpaired surrogates decode to `U+FFFD`: names are only ever compared, and the original bytes
/// are what gets written back out.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i] as u16;
        let continuation = |offset: usize| -> Option<u16> {
            bytes
                .get(i + offset)
                .filter(|b| *b & 0b1100_0000 == 0b1000_0000)
                .map(|b| (*b & 0x3F) as u16)
        };

        if b0 & 0x80 == 0 {
            units.push(b0);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            match continuation(1) {
                Some(b1) => {
                    units.push((b0 & 0x1F) << 6 | b1);
                    i += 2;
                }
                None => {
                    units.push(0xFFFD);
                    i += 1;
                }
            }
        } else if b0 & 0xF0 == 0xE0 {
            match (continuation(1), continuation(2)) {
                (Some(b1), Some(b2)) => {
                    units.push((b0 & 0x0F) << 12 | b1 << 6 | b2);
                    i += 3;
                }
                _ => {
                    units.push(0xFFFD);
                    i += 1;
                }
            }
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]), "a\x00a");
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(decode_modified_utf8(b"func_180447_b"), "func_180447_b");
    }

    #[test]
    fn two_and_three_byte_encodings() {
        let two_bytes = "ĄǍǞǠǺȀȂȦȺӐӒ";
        assert_eq!(
            encode_modified_utf8(two_bytes),
            vec![
                196, 132, 199, 141, 199, 158, 199, 160, 199, 186, 200, 128, 200, 130, 200, 166,
                200, 186, 211, 144, 211, 146
            ]
        );
        assert_eq!(decode_modified_utf8(&encode_modified_utf8(two_bytes)), two_bytes);

        let three_bytes = "ऄअॲঅਅઅଅஅఅಅഅะະ༁ཨ";
        assert_eq!(
            decode_modified_utf8(&encode_modified_utf8(three_bytes)),
            three_bytes
        );
    }

    #[test]
    fn supplementary_characters() {
        let encoded = vec![
            237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237, 191,
            191,
        ];
        assert_eq!(encode_modified_utf8("\u{10000}\u{dffff}\u{10FFFF}"), encoded);
        assert_eq!(decode_modified_utf8(&encoded), "\u{10000}\u{dffff}\u{10FFFF}");
    }

    #[test]
    fn malformed_bytes() {
        assert_eq!(decode_modified_utf8(&[0xC0]), "\u{FFFD}");
        assert_eq!(decode_modified_utf8(&[0xFF, 0x41]), "\u{FFFD}A");
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

impl ConstantIndex {
    /// Index 0 is never a valid entry (it is used to mean "absent", eg. for `super_class`)
    pub const NONE: ConstantIndex = ConstantIndex(0);
}

macro_rules! typed_index {
    ($index:ident) => {
        impl From<$index> for ConstantIndex {
            fn from(index: $index) -> ConstantIndex {
                index.0
            }
        }

        impl Serialize for $index {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                self.0.serialize(writer)
            }
        }

        impl Deserialize for $index {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
                Ok($index(ConstantIndex::deserialize(reader)?))
            }
        }
    };
}

typed_index!(Utf8ConstantIndex);
typed_index!(ClassConstantIndex);
typed_index!(NameAndTypeConstantIndex);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    fn tag(&self) -> u8 {
        match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        }
    }
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let kind = match u8::deserialize(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Unknown method handle kind {}", other),
                ))
            }
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(bytes: &[u8]) -> ConstantPool {
        ConstantPool::parse(&mut Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.get_long(7).unwrap();
        let utf8 = pool.get_utf8("after").unwrap();
        assert_eq!(long, ConstantIndex(1));
        assert_eq!(utf8, Utf8ConstantIndex(ConstantIndex(3)));
        assert_eq!(pool.len(), 4);
        assert!(pool.constant(ConstantIndex(2)).is_err());
    }

    #[test]
    fn insertions_are_deduplicated() {
        let mut pool = ConstantPool::new();
        let owner = BinaryName::OBJECT;
        let first = pool.get_field_ref(&owner, "x", "I").unwrap();
        let second = pool.get_field_ref(&owner, "x", "I").unwrap();
        assert_eq!(first, second);
        assert_ne!(first, pool.get_field_ref(&owner, "y", "I").unwrap());

        let member = pool.member(first).unwrap();
        assert_eq!(member.owner, "java/lang/Object");
        assert_eq!(member.name, "x");
        assert_eq!(member.descriptor, "I");
        assert!(!member.is_interface);
    }

    #[test]
    fn original_entries_are_kept_verbatim() {
        let mut pool = ConstantPool::new();
        pool.get_string("hello").unwrap();
        pool.get_double(1.5).unwrap();
        let mut bytes = vec![];
        pool.serialize(&mut bytes).unwrap();

        let mut reparsed = parse(&bytes);
        assert_eq!(reparsed.original_len(), pool.len());
        let mut reencoded = vec![];
        reparsed.serialize(&mut reencoded).unwrap();
        assert_eq!(bytes, reencoded);

        // Lookups see the original entries, new entries go at the end
        assert_eq!(reparsed.get_utf8("hello").unwrap(), Utf8ConstantIndex(ConstantIndex(1)));
        let appended = reparsed.get_integer(3).unwrap();
        assert_eq!(appended.0 as usize, pool.len());

        let mut extended = vec![];
        reparsed.serialize(&mut extended).unwrap();
        assert_eq!(&extended[2..bytes.len()], &bytes[2..]);
        assert_eq!(&extended[bytes.len()..], &[3, 0, 0, 0, 3][..]);
    }

    #[test]
    fn unknown_tag() {
        let bytes = [0u8, 2, 42];
        assert!(ConstantPool::parse(&mut Cursor::new(&bytes[..])).is_err());
    }
}
