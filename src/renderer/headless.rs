//! Headless recording device.
//!
//! [`HeadlessDevice`] implements [`GpuDevice`] without a GPU. It records
//! every call as a [`DeviceCommand`], keeps the live object tables a driver
//! would keep, and reflects GLSL sources the way a GL driver reports active
//! uniforms and attributes (struct members expanded, basic-type arrays
//! reported once as `name[0]`). A small preprocessor evaluates
//! `#define` / `#undef` / `#ifdef` / `#ifndef` / `#else` / `#endif`, so the
//! reflected interface follows the permutation's defines. An active
//! `#error` directive fails compilation.
//!
//! Used by the test suite and the headless demo.

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;

use crate::errors::{KilnError, Result};
use crate::renderer::device::{
    ActiveVariable, BufferId, BufferTarget, ClearFlags, GlslType, GpuDevice, ImageData, ProgramId,
    RenderTargetId, ShaderId, ShaderStage, TextureDescriptor, TextureId, UniformData,
    VertexAttributeLayout,
};
use crate::resources::DrawMode;

/// A recorded uniform payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedUniform {
    Floats(Vec<f32>),
    Ints(Vec<i32>),
}

impl RecordedUniform {
    #[must_use]
    pub fn floats(&self) -> Option<&[f32]> {
        match self {
            Self::Floats(v) => Some(v),
            Self::Ints(_) => None,
        }
    }

    #[must_use]
    pub fn ints(&self) -> Option<&[i32]> {
        match self {
            Self::Ints(v) => Some(v),
            Self::Floats(_) => None,
        }
    }
}

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateBuffer { buffer: BufferId, target: BufferTarget, size: usize },
    DeleteBuffer(BufferId),
    CreateTexture { texture: TextureId, desc: TextureDescriptor },
    DeleteTexture(TextureId),
    BindTexture { unit: u32, texture: TextureId },
    CompileShader { shader: ShaderId, stage: ShaderStage },
    DeleteShader(ShaderId),
    LinkProgram { program: ProgramId, vertex: ShaderId, fragment: ShaderId },
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    Uniform { program: Option<ProgramId>, name: String, value: RecordedUniform },
    EnableAttribute { location: u32, name: String, buffer: BufferId, layout: VertexAttributeLayout },
    DisableAttribute(u32),
    BindIndexBuffer(BufferId),
    Viewport { x: i32, y: i32, width: u32, height: u32 },
    Clear { flags: ClearFlags, color: [f32; 4] },
    DepthTest(bool),
    CullMode(Option<wgpu::Face>),
    Blend(Option<wgpu::BlendState>),
    CreateRenderTarget { target: RenderTargetId, width: u32, height: u32 },
    DeleteRenderTarget(RenderTargetId),
    BindRenderTarget(Option<RenderTargetId>),
    DrawArrays { program: Option<ProgramId>, mode: DrawMode, first: u32, count: u32 },
    DrawElements { program: Option<ProgramId>, mode: DrawMode, count: u32, format: wgpu::IndexFormat },
}

#[derive(Debug, Clone)]
struct CompiledShader {
    stage: ShaderStage,
    source: String,
    uniforms: Vec<(String, GlslType, usize)>,
    attributes: Vec<(String, GlslType, usize)>,
}

#[derive(Debug, Clone, Default)]
struct LinkedProgram {
    uniforms: Vec<ActiveVariable>,
    attributes: Vec<ActiveVariable>,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    commands: Vec<DeviceCommand>,

    buffers: SlotMap<BufferId, (BufferTarget, usize)>,
    textures: SlotMap<TextureId, TextureDescriptor>,
    shaders: SlotMap<ShaderId, CompiledShader>,
    programs: SlotMap<ProgramId, LinkedProgram>,
    render_targets: SlotMap<RenderTargetId, (u32, u32)>,

    current_program: Option<ProgramId>,
    enabled_attributes: FxHashSet<u32>,
    uniform_values: FxHashMap<(ProgramId, String), RecordedUniform>,

    back_buffer: (u32, u32),
    fail_links: bool,
    texture_budget: Option<usize>,
    compile_calls: usize,
    link_calls: usize,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl HeadlessDevice {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            commands: Vec::new(),
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            render_targets: SlotMap::with_key(),
            current_program: None,
            enabled_attributes: FxHashSet::default(),
            uniform_values: FxHashMap::default(),
            back_buffer: (width, height),
            fail_links: false,
            texture_budget: None,
            compile_calls: 0,
            link_calls: 0,
        }
    }

    /// Makes every following link fail.
    pub fn set_fail_links(&mut self, fail: bool) {
        self.fail_links = fail;
    }

    /// Lets `budget` more textures be created, then fails every following
    /// creation. `None` removes the limit.
    pub fn set_texture_budget(&mut self, budget: Option<usize>) {
        self.texture_budget = budget;
    }

    pub fn set_back_buffer_size(&mut self, width: u32, height: u32) {
        self.back_buffer = (width, height);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    #[must_use]
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of recorded draw calls.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DeviceCommand::DrawArrays { .. } | DeviceCommand::DrawElements { .. }))
            .count()
    }

    /// Every value uploaded to uniform `name`, in call order, across programs.
    #[must_use]
    pub fn uniform_history(&self, name: &str) -> Vec<&RecordedUniform> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::Uniform { name: n, value, .. } if n == name => Some(value),
                _ => None,
            })
            .collect()
    }

    /// The last value uploaded to `name` on `program`.
    #[must_use]
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<&RecordedUniform> {
        self.uniform_values.get(&(program, name.to_string()))
    }

    #[must_use]
    pub fn shader_source(&self, shader: ShaderId) -> Option<&str> {
        self.shaders.get(shader).map(|s| s.source.as_str())
    }

    #[must_use]
    pub fn texture(&self, texture: TextureId) -> Option<&TextureDescriptor> {
        self.textures.get(texture)
    }

    #[must_use]
    pub fn compile_calls(&self) -> usize {
        self.compile_calls
    }

    #[must_use]
    pub fn link_calls(&self) -> usize {
        self.link_calls
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn live_render_targets(&self) -> usize {
        self.render_targets.len()
    }

    #[must_use]
    pub fn enabled_attribute_count(&self) -> usize {
        self.enabled_attributes.len()
    }

    fn record(&mut self, command: DeviceCommand) {
        self.commands.push(command);
    }

    fn variable_name(&self, location: u32, attributes: bool) -> String {
        self.current_program
            .and_then(|p| self.programs.get(p))
            .and_then(|p| {
                let table = if attributes { &p.attributes } else { &p.uniforms };
                table.iter().find(|v| v.location == location)
            })
            .map_or_else(|| format!("<location {location}>"), |v| v.name.clone())
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> Result<BufferId> {
        let buffer = self.buffers.insert((target, data.len()));
        self.record(DeviceCommand::CreateBuffer {
            buffer,
            target,
            size: data.len(),
        });
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(buffer);
        self.record(DeviceCommand::DeleteBuffer(buffer));
    }

    fn create_texture(&mut self, desc: &TextureDescriptor, faces: &[ImageData<'_>]) -> Result<TextureId> {
        let expected = match desc.kind {
            crate::resources::TextureKind::D2 => 1,
            crate::resources::TextureKind::Cube => 6,
        };
        if faces.len() != expected {
            return Err(KilnError::Device(format!(
                "texture expects {expected} faces, got {}",
                faces.len()
            )));
        }
        match self.texture_budget {
            Some(0) => return Err(KilnError::Device("out of texture memory".to_string())),
            Some(ref mut left) => *left -= 1,
            None => {}
        }
        let texture = self.textures.insert(*desc);
        self.record(DeviceCommand::CreateTexture { texture, desc: *desc });
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(texture);
        self.record(DeviceCommand::DeleteTexture(texture));
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.record(DeviceCommand::BindTexture { unit, texture });
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId> {
        self.compile_calls += 1;

        let (text, defines) = preprocess(source).map_err(KilnError::ShaderCompile)?;
        let (uniforms, attributes) =
            reflect(&text, &defines, stage).map_err(KilnError::ShaderCompile)?;

        let shader = self.shaders.insert(CompiledShader {
            stage,
            source: source.to_string(),
            uniforms,
            attributes,
        });
        self.record(DeviceCommand::CompileShader { shader, stage });
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(shader);
        self.record(DeviceCommand::DeleteShader(shader));
    }

    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId> {
        self.link_calls += 1;
        if self.fail_links {
            return Err(KilnError::ProgramLink("link failure requested".to_string()));
        }

        let (Some(vs), Some(fs)) = (self.shaders.get(vertex), self.shaders.get(fragment)) else {
            return Err(KilnError::ProgramLink("unknown shader handle".to_string()));
        };
        if vs.stage != ShaderStage::Vertex || fs.stage != ShaderStage::Fragment {
            return Err(KilnError::ProgramLink("shader stages do not match".to_string()));
        }

        let mut linked = LinkedProgram::default();
        for (name, ty, size) in vs.uniforms.iter().chain(&fs.uniforms) {
            if let Some(existing) = linked.uniforms.iter().find(|u| &u.name == name) {
                if existing.ty != *ty {
                    return Err(KilnError::ProgramLink(format!(
                        "uniform '{name}' declared with different types"
                    )));
                }
                continue;
            }
            let location = linked.uniforms.len() as u32;
            linked.uniforms.push(ActiveVariable {
                name: name.clone(),
                ty: *ty,
                location,
                size: *size,
            });
        }
        for (location, (name, ty, size)) in vs.attributes.iter().enumerate() {
            linked.attributes.push(ActiveVariable {
                name: name.clone(),
                ty: *ty,
                location: location as u32,
                size: *size,
            });
        }

        let program = self.programs.insert(linked);
        self.record(DeviceCommand::LinkProgram {
            program,
            vertex,
            fragment,
        });
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(program);
        self.uniform_values.retain(|(p, _), _| *p != program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.record(DeviceCommand::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current_program = Some(program);
        self.record(DeviceCommand::UseProgram(program));
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveVariable> {
        self.programs
            .get(program)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn active_attributes(&self, program: ProgramId) -> Vec<ActiveVariable> {
        self.programs
            .get(program)
            .map(|p| p.attributes.clone())
            .unwrap_or_default()
    }

    fn upload_uniform(&mut self, location: u32, _ty: GlslType, data: UniformData<'_>) {
        let name = self.variable_name(location, false);
        let value = match data {
            UniformData::Floats(v) => RecordedUniform::Floats(v.to_vec()),
            UniformData::Ints(v) => RecordedUniform::Ints(v.to_vec()),
        };
        if let Some(program) = self.current_program {
            self.uniform_values.insert((program, name.clone()), value.clone());
        }
        self.record(DeviceCommand::Uniform {
            program: self.current_program,
            name,
            value,
        });
    }

    fn enable_vertex_attribute(&mut self, location: u32, buffer: BufferId, layout: &VertexAttributeLayout) {
        let name = self.variable_name(location, true);
        self.enabled_attributes.insert(location);
        self.record(DeviceCommand::EnableAttribute {
            location,
            name,
            buffer,
            layout: *layout,
        });
    }

    fn disable_vertex_attribute(&mut self, location: u32) {
        self.enabled_attributes.remove(&location);
        self.record(DeviceCommand::DisableAttribute(location));
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) {
        self.record(DeviceCommand::BindIndexBuffer(buffer));
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.record(DeviceCommand::Viewport { x, y, width, height });
    }

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4]) {
        self.record(DeviceCommand::Clear { flags, color });
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.record(DeviceCommand::DepthTest(enabled));
    }

    fn set_cull_mode(&mut self, face: Option<wgpu::Face>) {
        self.record(DeviceCommand::CullMode(face));
    }

    fn set_blend_state(&mut self, blend: Option<wgpu::BlendState>) {
        self.record(DeviceCommand::Blend(blend));
    }

    fn create_render_target(&mut self, width: u32, height: u32) -> Result<RenderTargetId> {
        let target = self.render_targets.insert((width, height));
        self.record(DeviceCommand::CreateRenderTarget { target, width, height });
        Ok(target)
    }

    fn delete_render_target(&mut self, target: RenderTargetId) {
        self.render_targets.remove(target);
        self.record(DeviceCommand::DeleteRenderTarget(target));
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetId>) {
        self.record(DeviceCommand::BindRenderTarget(target));
    }

    fn back_buffer_size(&self) -> (u32, u32) {
        self.back_buffer
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) {
        self.record(DeviceCommand::DrawArrays {
            program: self.current_program,
            mode,
            first,
            count,
        });
    }

    fn draw_elements(&mut self, mode: DrawMode, count: u32, format: wgpu::IndexFormat) {
        self.record(DeviceCommand::DrawElements {
            program: self.current_program,
            mode,
            count,
            format,
        });
    }
}

// ============================================================================
// GLSL preprocessing & reflection
// ============================================================================

type Declarations = Vec<(String, GlslType, usize)>;

/// Evaluates conditional directives and collects `#define`s.
fn preprocess(source: &str) -> std::result::Result<(String, FxHashMap<String, String>), String> {
    let mut defines: FxHashMap<String, String> = FxHashMap::default();
    // (enclosing block active, condition of this block, currently active)
    let mut stack: Vec<(bool, bool, bool)> = Vec::new();
    let mut out = String::with_capacity(source.len());

    for (number, raw) in strip_block_comments(source).lines().enumerate() {
        let line = raw.split("//").next().unwrap_or("").trim();
        let active = stack.last().is_none_or(|&(_, _, a)| a);

        if let Some(directive) = line.strip_prefix('#') {
            let mut parts = directive.trim().splitn(2, char::is_whitespace);
            let keyword = parts.next().unwrap_or("");
            let rest = parts.next().unwrap_or("").trim();

            match keyword {
                "ifdef" | "ifndef" => {
                    let defined = defines.contains_key(rest);
                    let condition = if keyword == "ifdef" { defined } else { !defined };
                    stack.push((active, condition, active && condition));
                }
                "else" => {
                    let Some(top) = stack.last_mut() else {
                        return Err(format!("{}: #else without #ifdef", number + 1));
                    };
                    top.2 = top.0 && !top.1;
                }
                "endif" => {
                    if stack.pop().is_none() {
                        return Err(format!("{}: #endif without #ifdef", number + 1));
                    }
                }
                _ if !active => {}
                "define" => {
                    let mut def = rest.splitn(2, char::is_whitespace);
                    let name = def.next().unwrap_or("").to_string();
                    let value = def.next().unwrap_or("").trim().to_string();
                    defines.insert(name, value);
                }
                "undef" => {
                    defines.remove(rest);
                }
                "error" => return Err(format!("{}: #error {rest}", number + 1)),
                "version" | "extension" | "pragma" => {}
                other => return Err(format!("{}: unsupported directive #{other}", number + 1)),
            }
            continue;
        }

        if active {
            out.push_str(line);
            out.push('\n');
        }
    }

    if !stack.is_empty() {
        return Err("unterminated #ifdef block".to_string());
    }
    Ok((out, defines))
}

fn strip_block_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        let punct = matches!(c, '{' | '}' | ';' | '[' | ']' | '(' | ')' | ',' | '=');
        if c.is_whitespace() || punct {
            if let Some(s) = start.take() {
                tokens.push(&text[s..i]);
            }
            if punct {
                tokens.push(&text[i..i + 1]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }
    tokens
}

#[derive(Debug, Clone)]
struct Declarator {
    ty: String,
    name: String,
    array: Option<usize>,
}

const QUALIFIERS: &[&str] = &["lowp", "mediump", "highp", "flat", "smooth", "centroid"];

/// Parses `type name[size]?, name2 ... ;` starting at `tokens[i]`. Returns the
/// declarators and the index after the `;`.
fn parse_declaration(
    tokens: &[&str],
    mut i: usize,
    defines: &FxHashMap<String, String>,
) -> std::result::Result<(Vec<Declarator>, usize), String> {
    while tokens.get(i).is_some_and(|t| QUALIFIERS.contains(t)) {
        i += 1;
    }
    let ty = (*tokens.get(i).ok_or("truncated declaration")?).to_string();
    i += 1;

    let mut out = Vec::new();
    loop {
        let name = (*tokens.get(i).ok_or("truncated declaration")?).to_string();
        i += 1;
        let mut array = None;
        if tokens.get(i) == Some(&"[") {
            let size_token = *tokens.get(i + 1).ok_or("truncated array size")?;
            let size = size_token
                .parse::<usize>()
                .ok()
                .or_else(|| defines.get(size_token).and_then(|v| v.parse().ok()))
                .ok_or_else(|| format!("cannot resolve array size '{size_token}'"))?;
            array = Some(size);
            i += 3; // n ]
        }
        out.push(Declarator {
            ty: ty.clone(),
            name,
            array,
        });
        match tokens.get(i) {
            Some(&",") => i += 1,
            Some(&";") => return Ok((out, i + 1)),
            other => return Err(format!("unexpected token {other:?} in declaration")),
        }
    }
}

fn expand(
    prefix: &str,
    decl: &Declarator,
    structs: &FxHashMap<String, Vec<Declarator>>,
    out: &mut Declarations,
) -> std::result::Result<(), String> {
    if let Some(ty) = GlslType::from_name(&decl.ty) {
        match decl.array {
            Some(size) => out.push((format!("{prefix}[0]"), ty, size)),
            None => out.push((prefix.to_string(), ty, 1)),
        }
        return Ok(());
    }

    let members = structs
        .get(&decl.ty)
        .ok_or_else(|| format!("unknown type '{}'", decl.ty))?;
    match decl.array {
        Some(size) => {
            for k in 0..size {
                for member in members {
                    expand(&format!("{prefix}[{k}].{}", member.name), member, structs, out)?;
                }
            }
        }
        None => {
            for member in members {
                expand(&format!("{prefix}.{}", member.name), member, structs, out)?;
            }
        }
    }
    Ok(())
}

/// Collects global uniform declarations and (vertex stage) input attributes.
fn reflect(
    text: &str,
    defines: &FxHashMap<String, String>,
    stage: ShaderStage,
) -> std::result::Result<(Declarations, Declarations), String> {
    let tokens = tokenize(text);
    let mut structs: FxHashMap<String, Vec<Declarator>> = FxHashMap::default();
    let mut uniforms = Declarations::new();
    let mut attributes = Declarations::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "{" => {
                depth += 1;
                i += 1;
            }
            "}" => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            "struct" if depth == 0 => {
                let name = (*tokens.get(i + 1).ok_or("truncated struct")?).to_string();
                if tokens.get(i + 2) != Some(&"{") {
                    return Err(format!("expected '{{' after struct {name}"));
                }
                i += 3;
                let mut members = Vec::new();
                while tokens.get(i).is_some_and(|t| *t != "}") {
                    let (decls, next) = parse_declaration(&tokens, i, defines)?;
                    members.extend(decls);
                    i = next;
                }
                // skip `}` and the closing `;`
                i += 1;
                while tokens.get(i).is_some_and(|t| *t != ";") {
                    i += 1;
                }
                i += 1;
                structs.insert(name, members);
            }
            "uniform" if depth == 0 => {
                let (decls, next) = parse_declaration(&tokens, i + 1, defines)?;
                for decl in &decls {
                    expand(&decl.name, decl, &structs, &mut uniforms)?;
                }
                i = next;
            }
            "in" | "attribute" if depth == 0 && stage == ShaderStage::Vertex => {
                let (decls, next) = parse_declaration(&tokens, i + 1, defines)?;
                for decl in &decls {
                    expand(&decl.name, decl, &structs, &mut attributes)?;
                }
                i = next;
            }
            _ => i += 1,
        }
    }

    Ok((uniforms, attributes))
}
