//! Non-dereferencing `Debug` impls, grounded on the teacher's
//! `Debug/StructDebug.rs` pattern: one formatting function per type, called
//! from the type's trait impl rather than inlined, so the formatting logic
//! reads the same whether the type lives behind a raw pointer, a region
//! view, or a named OS handle.

use crate::channel::Channel;

pub(crate) fn fmt_channel(channel: &Channel, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let diag = channel.diagnostics();
    f.debug_struct("Channel")
        .field("name", &channel.name())
        .field("scope", &channel.scope())
        .field("capacity", &channel.capacity())
        .field("active_nodes", &diag.header.active_nodes)
        .field("total_space", &diag.header.total_space)
        .field("free_list_len", &diag.free_list_len)
        .finish()
}
