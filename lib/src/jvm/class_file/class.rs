use crate::jvm::class_file::{
    Attribute, ClassConstantIndex, ConstantPool, Deserialize, Field, Method, Serialize, Version,
};
use crate::jvm::{ClassAccessFlags, Error};
use byteorder::WriteBytesExt;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Super class (index 0 only for `java/lang/Object` and `module-info`)
    pub super_class: ClassConstantIndex,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a class file
    ///
    /// The version is checked before anything else past the header is read, so that classes
    /// compiled for a newer JVM are refused rather than misread.
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = Cursor::new(bytes);

        let magic = u32::deserialize(&mut reader)?;
        if magic != u32::from_be_bytes(ClassFile::MAGIC) {
            return Err(Error::BadMagic(magic));
        }

        let version = Version::deserialize(&mut reader)?;
        if !version.is_supported() {
            return Err(Error::UnsupportedClassVersion(version));
        }

        let constants = ConstantPool::parse(&mut reader)?;
        let class_file = ClassFile {
            version,
            constants,
            access_flags: ClassAccessFlags::deserialize(&mut reader)?,
            this_class: ClassConstantIndex::deserialize(&mut reader)?,
            super_class: ClassConstantIndex::deserialize(&mut reader)?,
            interfaces: Vec::deserialize(&mut reader)?,
            fields: Vec::deserialize(&mut reader)?,
            methods: Vec::deserialize(&mut reader)?,
            attributes: Vec::deserialize(&mut reader)?,
        };

        let trailing = bytes.len() - reader.position() as usize;
        if trailing != 0 {
            return Err(Error::MalformedClass(format!(
                "{} trailing bytes after class file",
                trailing
            )));
        }
        Ok(class_file)
    }

    /// Encode the class file into a fresh buffer
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Find a class-level attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attr| self.constants.utf8(attr.name_index).ok() == Some(name))
    }

    /// Save the class file to disk
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> std::io::Result<()> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut class_file = fs::File::create(path)?;
        self.serialize(&mut class_file)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::RefType;

    fn empty_class(version: Version) -> ClassFile {
        let mut constants = ConstantPool::new();
        let this_class = constants
            .get_class(&RefType::from_class_name("me/Empty").unwrap())
            .unwrap();
        let super_class = constants
            .get_class(&RefType::from_class_name("java/lang/Object").unwrap())
            .unwrap();
        ClassFile {
            version,
            constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        }
    }

    #[test]
    fn parse_what_was_written() {
        let bytes = empty_class(Version::JAVA8).to_bytes().unwrap();
        assert_eq!(&bytes[..4], &ClassFile::MAGIC);

        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.version, Version::JAVA8);
        assert_eq!(parsed.constants.class_name(parsed.this_class).unwrap(), "me/Empty");
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn newer_versions_are_refused() {
        let future = Version {
            major_version: 99,
            minor_version: 0,
        };
        let bytes = empty_class(future).to_bytes().unwrap();
        match ClassFile::parse(&bytes) {
            Err(Error::UnsupportedClassVersion(version)) => assert_eq!(version, future),
            other => panic!("unexpected result {:?}", other.map(|c| c.version)),
        }
    }

    #[test]
    fn bad_magic() {
        assert!(matches!(
            ClassFile::parse(&[0xCA, 0xFE, 0xD0, 0x0D, 0, 0]),
            Err(Error::BadMagic(0xCAFED00D))
        ));
    }

    #[test]
    fn truncated() {
        let bytes = empty_class(Version::JAVA8).to_bytes().unwrap();
        assert!(ClassFile::parse(&bytes[..bytes.len() - 3]).is_err());
    }
}
