use crate::jvm::class_file::{self, ConstantPool};
use crate::jvm::{
    BinaryName, Error, FieldAccessFlags, FieldType, Name, ParseDescriptor, UnqualifiedName,
};

/// Field declared by a class
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUnit {
    pub access_flags: FieldAccessFlags,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

impl FieldUnit {
    pub(super) fn decode(
        field: &class_file::Field,
        constants: &ConstantPool,
    ) -> Result<FieldUnit, Error> {
        let name = UnqualifiedName::from_string(field.name(constants)?.to_owned())
            .map_err(Error::MalformedName)?;
        let descriptor = field.descriptor(constants)?;
        let descriptor = FieldType::parse(descriptor)
            .map_err(|_| Error::BadDescriptor(descriptor.to_owned()))?;
        Ok(FieldUnit {
            access_flags: field.access_flags,
            name,
            descriptor,
        })
    }
}
