use crate::jvm::class_file::{self, Attribute, ClassFile, ConstantPool, Version};
use crate::jvm::model::{FieldUnit, MethodUnit};
use crate::jvm::{
    BinaryName, Error, FieldAccessFlags, FieldType, Name, RenderDescriptor, UnqualifiedName,
};

/// Semantic representation of a class going through the patcher
///
/// Parsing decodes every method body up front. Whatever is left untouched is written back out
/// exactly as it came in: the constant pool only grows, methods whose body was not edited keep
/// their original `Code` attribute, and a class that wasn't modified at all is returned as the
/// original bytes.
#[derive(Debug, Clone)]
pub struct ClassUnit {
    class_file: ClassFile,
    original_bytes: Vec<u8>,

    /// Name of the class as it appears in the class file
    pub binary_name: BinaryName,

    /// Human readable name, when the symbol table knows one
    pub canonical_name: Option<BinaryName>,

    pub methods: Vec<MethodUnit>,
    pub fields: Vec<FieldUnit>,

    /// Have fields or class attributes been changed?
    members_modified: bool,
}

impl ClassUnit {
    pub fn parse(bytes: &[u8]) -> Result<ClassUnit, Error> {
        let class_file = ClassFile::parse(bytes)?;
        let constants = &class_file.constants;
        let binary_name = BinaryName::from_string(
            constants.class_name(class_file.this_class)?.to_owned(),
        )
        .map_err(Error::MalformedName)?;

        let uses_stack_map_frames = class_file.version.uses_stack_map_frames();
        let methods = class_file
            .methods
            .iter()
            .enumerate()
            .map(|(index, method)| {
                MethodUnit::decode(
                    index,
                    method,
                    constants,
                    &binary_name,
                    uses_stack_map_frames,
                )
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let fields = class_file
            .fields
            .iter()
            .map(|field| FieldUnit::decode(field, constants))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(ClassUnit {
            original_bytes: bytes.to_vec(),
            class_file,
            binary_name,
            canonical_name: None,
            methods,
            fields,
            members_modified: false,
        })
    }

    pub fn version(&self) -> Version {
        self.class_file.version
    }

    pub fn constants(&self) -> &ConstantPool {
        &self.class_file.constants
    }

    pub fn constants_mut(&mut self) -> &mut ConstantPool {
        &mut self.class_file.constants
    }

    /// Name to use in diagnostics (canonical if known)
    pub fn display_name(&self) -> &str {
        self.canonical_name
            .as_ref()
            .unwrap_or(&self.binary_name)
            .as_str()
    }

    /// Methods with a given name (there may be several overloads)
    pub fn methods_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (usize, &'a MethodUnit)> + 'a {
        self.methods
            .iter()
            .enumerate()
            .filter(move |(_, method)| method.name.as_str() == name)
    }

    /// Find a method by name, and optionally by descriptor
    pub fn method(&self, name: &str, descriptor: Option<&str>) -> Option<&MethodUnit> {
        self.methods.iter().find(|method| {
            method.name.as_str() == name
                && descriptor.map_or(true, |desc| method.descriptor.render() == desc)
        })
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name.as_str() == name)
    }

    /// Declare a new field (without any attributes)
    pub fn add_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: UnqualifiedName,
        descriptor: FieldType<BinaryName>,
    ) -> Result<(), Error> {
        let constants = &mut self.class_file.constants;
        let name_index = constants.get_utf8(name.as_str())?;
        let descriptor_index = constants.get_utf8(descriptor.render())?;
        self.class_file.fields.push(class_file::Field {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![],
        });
        self.fields.push(FieldUnit {
            access_flags,
            name,
            descriptor,
        });
        self.members_modified = true;
        Ok(())
    }

    /// Find a class-level attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.class_file.attribute(name)
    }

    /// Add a class-level attribute, replacing any existing one with the same name
    pub fn set_attribute(&mut self, name: &str, info: Vec<u8>) -> Result<(), Error> {
        let name_index = self.class_file.constants.get_utf8(name)?;
        let attribute = Attribute { name_index, info };
        match self
            .class_file
            .attributes
            .iter()
            .position(|attr| attr.name_index == name_index)
        {
            Some(position) => self.class_file.attributes[position] = attribute,
            None => self.class_file.attributes.push(attribute),
        }
        self.members_modified = true;
        Ok(())
    }

    pub fn is_modified(&self) -> bool {
        self.members_modified || self.methods.iter().any(MethodUnit::is_modified)
    }

    /// The bytes the class was parsed from
    pub fn original_bytes(&self) -> &[u8] {
        &self.original_bytes
    }

    /// Encode the class back into bytes
    ///
    /// Only the bodies of edited methods get re-encoded (see [`MethodUnit::validate`], which
    /// should be called first).
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        if !self.is_modified() {
            return Ok(self.original_bytes.clone());
        }

        let mut class_file = self.class_file.clone();
        for method in self.methods.iter().filter(|method| method.is_modified()) {
            let code = match method.encode(&mut class_file.constants)? {
                Some(code) => code,
                None => continue,
            };
            let attribute = class_file.constants.get_attribute(code)?;
            let raw_method = &mut class_file.methods[method.index];
            match raw_method
                .attributes
                .iter()
                .position(|attr| attr.name_index == attribute.name_index)
            {
                Some(position) => raw_method.attributes[position] = attribute,
                None => raw_method.attributes.push(attribute),
            }
        }
        Ok(class_file.to_bytes()?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{ClassConstantIndex, Code};
    use crate::jvm::code::{encode_code, BranchInstruction, Instruction, InstructionSequence};
    use crate::jvm::{ClassAccessFlags, MethodAccessFlags, RefType};

    /// Class with a static method `answer()I` returning 42
    fn answer_class() -> Vec<u8> {
        let mut constants = ConstantPool::new();
        let this_class: ClassConstantIndex = constants
            .get_class(&RefType::from_class_name("me/Answer").unwrap())
            .unwrap();
        let super_class = constants
            .get_class(&RefType::from_class_name("java/lang/Object").unwrap())
            .unwrap();

        let mut sequence = InstructionSequence::new();
        sequence.push(Instruction::BiPush(42)).unwrap();
        sequence.push(BranchInstruction::IReturn).unwrap();
        let code: Code = encode_code(&sequence, &mut constants, 1, 0, None).unwrap();
        let code = constants.get_attribute(code).unwrap();

        let method = class_file::Method {
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            name_index: constants.get_utf8("answer").unwrap(),
            descriptor_index: constants.get_utf8("()I").unwrap(),
            attributes: vec![code],
        };
        ClassFile {
            version: Version::JAVA8,
            constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![method],
            attributes: vec![],
        }
        .to_bytes()
        .unwrap()
    }

    #[test]
    fn unmodified_classes_are_untouched() {
        let bytes = answer_class();
        let class = ClassUnit::parse(&bytes).unwrap();
        assert_eq!(class.binary_name.as_str(), "me/Answer");
        assert_eq!(class.methods.len(), 1);
        assert!(class.method("answer", Some("()I")).is_some());
        assert!(class.method("answer", Some("()V")).is_none());
        assert!(!class.is_modified());
        assert_eq!(class.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn edited_methods_are_reencoded() {
        let mut class = ClassUnit::parse(&answer_class()).unwrap();
        let method = &mut class.methods[0];
        let code = method.code_mut().unwrap().unwrap();
        let first = code.first().unwrap();
        code.insert_before(
            first,
            vec![Instruction::IConst0.into(), Instruction::Pop.into()],
        )
        .unwrap();
        method.validate().unwrap();
        assert!(class.is_modified());

        let reparsed = ClassUnit::parse(&class.to_bytes().unwrap()).unwrap();
        let body = reparsed.methods[0].body().unwrap();
        assert_eq!(body.sequence.len(), 4);
        assert_eq!(body.max_stack, 1);
    }

    #[test]
    fn fields_and_attributes() {
        let mut class = ClassUnit::parse(&answer_class()).unwrap();
        assert!(!class.has_field("limit"));
        class
            .add_field(
                FieldAccessFlags::PUBLIC,
                UnqualifiedName::from_string(String::from("limit")).unwrap(),
                FieldType::boolean(),
            )
            .unwrap();
        class.set_attribute("Marker", vec![1, 2]).unwrap();
        class.set_attribute("Marker", vec![3]).unwrap();

        let reparsed = ClassUnit::parse(&class.to_bytes().unwrap()).unwrap();
        assert!(reparsed.has_field("limit"));
        assert_eq!(reparsed.fields[0].descriptor, FieldType::boolean());
        assert_eq!(reparsed.attribute("Marker").unwrap().info, vec![3]);
    }

    #[test]
    fn unbalanced_edits_fail_validation() {
        let mut class = ClassUnit::parse(&answer_class()).unwrap();
        let method = &mut class.methods[0];
        let code = method.code_mut().unwrap().unwrap();
        let first = code.first().unwrap();
        code.insert_before(first, vec![Instruction::IConst0.into()])
            .unwrap();
        assert!(matches!(
            method.validate(),
            Err(Error::UnbalancedInsertion { .. })
        ));
    }
}
