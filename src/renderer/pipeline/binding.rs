//! Program interface reflection and typed uniform upload.
//!
//! A [`ShaderProgram`] wraps a linked program handle together with its
//! active uniforms and attributes, queried from the device exactly once at
//! link time. Name lookups never fail hard: a name the program does not
//! expose yields `None` and is reported with one warning per program.

use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::renderer::device::{ActiveVariable, GpuDevice, ProgramId, UniformData};
use crate::renderer::pipeline::uniforms::UniformValue;

#[derive(Debug, Clone)]
pub struct ShaderProgram {
    program: ProgramId,
    /// Cache key of the (vertex, fragment) pair.
    key: u32,
    uniforms: FxHashMap<String, ActiveVariable>,
    attributes: FxHashMap<String, ActiveVariable>,
    warned: FxHashSet<String>,
}

impl ShaderProgram {
    /// Reflects the active interface of a freshly linked program.
    pub fn reflect(device: &impl GpuDevice, program: ProgramId, key: u32) -> Self {
        let uniforms = device
            .active_uniforms(program)
            .into_iter()
            .map(|v| (v.name.clone(), v))
            .collect();
        let attributes = device
            .active_attributes(program)
            .into_iter()
            .map(|v| (v.name.clone(), v))
            .collect();

        Self {
            program,
            key,
            uniforms,
            attributes,
            warned: FxHashSet::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ProgramId {
        self.program
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> u32 {
        self.key
    }

    #[must_use]
    pub fn uniforms(&self) -> impl Iterator<Item = &ActiveVariable> {
        self.uniforms.values()
    }

    #[must_use]
    pub fn attributes(&self) -> impl Iterator<Item = &ActiveVariable> {
        self.attributes.values()
    }

    /// Looks a uniform up without warning. Arrays also match their bare name.
    #[must_use]
    pub fn find_uniform(&self, name: &str) -> Option<&ActiveVariable> {
        self.uniforms
            .get(name)
            .or_else(|| self.uniforms.get(&format!("{name}[0]")))
    }

    #[must_use]
    pub fn has_uniform(&self, name: &str) -> bool {
        self.find_uniform(name).is_some()
    }

    /// Location of an active uniform; warns once per missing name.
    pub fn uniform_location(&mut self, name: &str) -> Option<u32> {
        if let Some(var) = self.find_uniform(name) {
            return Some(var.location);
        }
        self.warn_missing("uniform", name);
        None
    }

    /// Location of an active vertex attribute; warns once per missing name.
    pub fn attribute_location(&mut self, name: &str) -> Option<u32> {
        if let Some(var) = self.attributes.get(name) {
            return Some(var.location);
        }
        self.warn_missing("attribute", name);
        None
    }

    fn warn_missing(&mut self, what: &str, name: &str) {
        if self.warned.insert(format!("{what}:{name}")) {
            warn!("Program {:#010x}: {what} '{name}' is not active", self.key);
        }
    }

    /// Uploads `value` to uniform `name`, recursing through structs and
    /// arrays of structs.
    pub fn update_uniform(&mut self, device: &mut impl GpuDevice, name: &str, value: &UniformValue) {
        match value {
            UniformValue::Struct(members) => {
                for (member, v) in members {
                    self.update_uniform(device, &format!("{name}.{member}"), v);
                }
            }
            UniformValue::Array(items) if value.is_struct_array() => {
                for (i, item) in items.iter().enumerate() {
                    self.update_uniform(device, &format!("{name}[{i}]"), item);
                }
            }
            leaf => self.upload_leaf(device, name, leaf),
        }
    }

    fn upload_leaf(&mut self, device: &mut impl GpuDevice, name: &str, value: &UniformValue) {
        let Some(var) = self.find_uniform(name).cloned() else {
            self.warn_missing("uniform", name);
            return;
        };

        if var.ty.is_integer() {
            let mut ints = Vec::new();
            value.flatten_i32(&mut ints);
            device.upload_uniform(var.location, var.ty, UniformData::Ints(&ints));
        } else {
            let mut floats = Vec::new();
            value.flatten_f32(&mut floats);
            device.upload_uniform(var.location, var.ty, UniformData::Floats(&floats));
        }
    }
}
