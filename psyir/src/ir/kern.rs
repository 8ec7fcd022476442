use crate::config::Config;
use crate::config::KernelNaming;
use crate::error::generation_error;
use crate::error::not_implemented;
use crate::error::PsyError;
use crate::frontend::KernelSource;
use crate::ir::call::reduction_ref;
use crate::ir::gen::GenContext;
use crate::ir::Call;
use crate::ir::Node;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::targ3t::fortran::GenKind;
use crate::targ3t::fortran::GenNode;
use crate::targ3t::fortran::GuardedGenNode;
use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::io::Write;
use tracing::info;

/// A call to a user-supplied kernel subroutine.
#[derive(Clone, Debug)]
pub struct Kern {
    call: Call,
    module_name: String,
    modified: bool,
    module_inline: bool,
    source: Option<KernelSource>,
}

impl Kern {
    pub fn new(call: Call, module_name: &str) -> Kern {
        Kern {
            call,
            module_name: module_name.to_string(),
            modified: false,
            module_inline: false,
            source: None,
        }
    }
    pub fn with_source(mut self, source: KernelSource) -> Kern {
        self.source = Some(source);
        self
    }
    pub fn call(&self) -> &Call {
        &self.call
    }
    pub fn call_mut(&mut self) -> &mut Call {
        &mut self.call
    }
    pub fn name(&self) -> &str {
        self.call.name()
    }
    pub fn module_name(&self) -> &str {
        &self.module_name
    }
    /// Whether the kernel source was changed by a transformation and
    /// therefore has to be written out under a new name.
    pub fn modified(&self) -> bool {
        self.modified
    }
    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }
    pub fn module_inline(&self) -> bool {
        self.module_inline
    }
    pub fn set_module_inline(&mut self, module_inline: bool) {
        self.module_inline = module_inline;
    }
    pub fn source(&self) -> Option<&KernelSource> {
        self.source.as_ref()
    }
    pub fn source_mut(&mut self) -> Option<&mut KernelSource> {
        self.source.as_mut()
    }
    pub fn label(&self) -> String {
        let args: Vec<&str> = self.call.arguments().iter().map(|a| a.name()).collect();
        format!(
            "KernCall {}({}) [module_inline={}]",
            self.name(),
            args.join(","),
            self.module_inline
        )
    }
    /// Write a transformed kernel to the kernel output directory under a
    /// unique name and rename the kernel to match.
    ///
    /// Does nothing when the kernel was not modified.
    pub fn rename_and_write(node: &Shared<Node>, config: &Config) -> Result<()> {
        let (name, module_name, source) = {
            let node = node.rd();
            let kern = node
                .as_kern()
                .ok_or_else(|| generation_error!("'{}' is not a kernel", node.type_name()))?;
            if !kern.modified {
                return Ok(());
            }
            if kern.module_inline {
                return Err(not_implemented!(
                    "Cannot module-inline a transformed kernel ({})",
                    kern.name()
                ));
            }
            let source = kern.source.clone().ok_or_else(|| {
                generation_error!("kernel '{}' was modified but has no source", kern.name())
            })?;
            (kern.name().to_string(), kern.module_name.clone(), source)
        };
        let base = strip_suffix_ignore_case(&module_name, "_mod").unwrap_or(&module_name);
        let dir = &config.kernel_output_dir;
        let mut idx = 0;
        let (path, file) = loop {
            let path = dir.join(format!("{base}_{idx}_mod.f90"));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, Some(file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if config.kernel_naming == KernelNaming::Single {
                        break (path, None);
                    }
                    idx += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };
        let tag = format!("_{idx}");
        let new_kern_name = new_name(&name, &tag, "_code");
        let new_module_name = new_name(&module_name, &tag, "_mod");
        let mut renames = HashMap::new();
        renames.insert(name.to_lowercase(), new_kern_name.clone());
        renames.insert(module_name.to_lowercase(), new_module_name.clone());
        if let Some(type_name) = source.type_name(&name) {
            renames.insert(type_name.to_lowercase(), new_name(&type_name, &tag, "_type"));
        }
        let mut source = source;
        source.rename(&renames);
        let text = source.to_string();
        {
            let mut node = node.wr();
            if let Some(kern) = node.as_kern_mut() {
                kern.modified = false;
                kern.call.set_name(&new_kern_name);
                kern.module_name = new_module_name.clone();
                kern.source = Some(source);
            }
        }
        match file {
            Some(mut file) => {
                file.write_all(text.as_bytes())?;
                info!("Wrote transformed kernel {new_kern_name} to {}", path.display());
            }
            None => {
                let existing = fs::read_to_string(&path)?;
                if existing != text {
                    return Err(PsyError::ResourceConflict(format!(
                        "A transformed version of this Kernel '{module_name}.f90' already \
                         exists in the kernel-output directory ({}) but is not the same as \
                         the current, transformed kernel and the kernel-renaming scheme is set \
                         to '{}'. (If you wish to generate a new, unique kernel for every \
                         kernel that is transformed then use '--kernel-renaming multiple'.)",
                        dir.display(),
                        config.kernel_naming
                    ))
                    .into());
                }
                info!("Reusing transformed kernel in {}", path.display());
            }
        }
        Ok(())
    }
}

/// `name` without a trailing `suffix`, matching the suffix in any case.
fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(split) || !name[split..].eq_ignore_ascii_case(suffix) {
        return None;
    }
    Some(&name[..split])
}

/// Insert `tag` into `orig` just before `suffix`, or append `tag` and
/// `suffix` when `orig` does not end with `suffix`. Fortran names are case
/// insensitive so `suffix` matches in any case.
pub fn new_name(orig: &str, tag: &str, suffix: &str) -> String {
    match strip_suffix_ignore_case(orig, suffix) {
        Some(base) => format!("{base}{tag}{suffix}"),
        None => format!("{orig}{tag}{suffix}"),
    }
}

pub(crate) fn gen_kern(
    node: &Shared<Node>,
    parent: &Shared<GenNode>,
    ctx: &GenContext,
) -> Result<()> {
    Kern::rename_and_write(node, ctx.config)?;
    let (name, module_name, module_inline, args, reduction) = {
        let node = node.rd();
        let kern = node
            .as_kern()
            .ok_or_else(|| generation_error!("'{}' is not a kernel", node.type_name()))?;
        (
            kern.name().to_string(),
            kern.module_name.clone(),
            kern.module_inline,
            kern.call.arguments().to_vec(),
            kern.call.reduction_arg().map(|a| a.name().to_string()),
        )
    };
    let args = args
        .iter()
        .map(|arg| match &reduction {
            Some(reduction) if reduction == arg.name() => reduction_ref(node, arg.name(), ctx),
            _ => arg.name().to_string(),
        })
        .collect();
    parent.add(GenKind::call(&name, args));
    if !module_inline {
        parent.add(GenKind::use_only(&module_name, &[&name]));
    }
    Ok(())
}
