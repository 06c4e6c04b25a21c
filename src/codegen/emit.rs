//! Template instantiation.

use crate::catalog::{Source, Template};
use crate::core::cache::TranslationCache;
use crate::core::context::ContextLayout;
use crate::core::window::AddressWindow;

/// Values available to fixups during one emission.
pub(crate) struct Operands<'a> {
    window: &'a AddressWindow,
    layout: &'a ContextLayout,
    params: &'a [u64],
}

impl<'a> Operands<'a> {
    pub(crate) fn new(window: &'a AddressWindow, layout: &'a ContextLayout, params: &'a [u64]) -> Self {
        Self {
            window,
            layout,
            params,
        }
    }

    /// Raw value of `source`; missing parameters read as zero.
    pub(crate) fn value(&self, source: Source) -> u64 {
        match source {
            Source::Param(n) => self.params.get(n as usize).copied().unwrap_or(0),
            Source::Window(field) => self.window.value(field),
            Source::Context(field) => self.layout.offset(field) as i64 as u64,
        }
    }
}

/// Copy `template` to the cursor and patch its fixups in place.
pub(crate) fn instantiate(
    cache: &mut TranslationCache,
    template: &Template,
    operands: &Operands<'_>,
) -> Option<usize> {
    let at = cache.emit(template.bytes())?;
    for fixup in template.fixups() {
        let offset = at + fixup.offset;
        let site = cache.address(offset) as u64;
        let value = fixup.encode(site, operands.value(fixup.source));
        cache.patch(offset, fixup.field, value);
    }
    Some(at)
}
