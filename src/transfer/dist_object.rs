//! The container side of a transfer, and the four-phase engine driving it.
//!
//! 1. copy and permute: same and permuted entries are copied locally and
//!    always overwrite, whatever the combine mode;
//! 2. pack: the sending object serializes every entry of the send list;
//! 3. exchange: the plan's distributor moves the packets;
//! 4. unpack and combine: received packets merge into the receiving object
//!    under the caller's [`CombineMode`].

use bytemuck::Pod;
use std::sync::Arc;

use crate::algs::collective::agree_if;
use crate::algs::communicator::Communicator;
use crate::algs::wire::WireCount;
use crate::partition::{IndexPartition, LocalId};
use crate::remap_error::RemapError;
use crate::transfer::RedistributionPattern;
use crate::transfer::combine::CombineMode;
use crate::transfer::config::ExchangeConfig;
use crate::transfer::plan::TransferLists;

/// Packets per local entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketLayout {
    /// Every entry packs exactly this many packets.
    Constant(usize),
    /// Entries pack different counts; counts are exchanged before payload.
    Variable,
}

/// A distributed container that can be the source or the target of a transfer.
pub trait Transferable {
    /// Unit of data on the wire.
    type Packet: Pod + Send + Sync;

    /// Layout of the local entries; must match the side of the pattern the
    /// object is used on.
    fn partition(&self) -> &Arc<IndexPartition>;

    /// Number of local entries.
    fn local_len(&self) -> usize;

    fn packet_layout(&self) -> PacketLayout;

    /// Shape checks beyond the entry count (e.g. equal column counts).
    fn check_sizes(&self, _source: &Self) -> Result<(), RemapError> {
        Ok(())
    }

    fn supports_combine(&self, mode: CombineMode) -> bool;

    /// Copy the first `num_same` entries and the permuted entries from `source`.
    fn copy_and_permute(
        &mut self,
        source: &Self,
        num_same: usize,
        permute_to: &[LocalId],
        permute_from: &[LocalId],
    ) -> Result<(), RemapError>;

    /// Append the packets of `export_lids` to `exports`, in order, and record
    /// how many each entry produced.
    fn pack_and_prepare(
        &self,
        export_lids: &[LocalId],
        exports: &mut Vec<Self::Packet>,
        packets_per_lid: &mut [usize],
    ) -> Result<(), RemapError>;

    /// Merge `imports` into the entries `import_lids`, consuming
    /// `packets_per_lid[k]` packets for entry `k`.
    fn unpack_and_combine(
        &mut self,
        import_lids: &[LocalId],
        imports: &[Self::Packet],
        packets_per_lid: &[usize],
        mode: CombineMode,
    ) -> Result<(), RemapError>;
}

fn check_preconditions<O: Transferable>(
    target: &O,
    source: &O,
    lists: &TransferLists<'_>,
    mode: CombineMode,
) -> Result<(), RemapError> {
    if source.local_len() != lists.from.local_count() {
        return Err(RemapError::SizeMismatch {
            what: "source object length",
            expected: lists.from.local_count(),
            got: source.local_len(),
        });
    }
    if target.local_len() != lists.into.local_count() {
        return Err(RemapError::SizeMismatch {
            what: "target object length",
            expected: lists.into.local_count(),
            got: target.local_len(),
        });
    }
    if !source.partition().has_local_layout_of(lists.from) {
        return Err(RemapError::LayoutMismatch { what: "source" });
    }
    if !target.partition().has_local_layout_of(lists.into) {
        return Err(RemapError::LayoutMismatch { what: "target" });
    }
    target.check_sizes(source)?;
    if !target.supports_combine(mode) {
        return Err(RemapError::UnsupportedCombineMode(mode));
    }
    Ok(())
}

/// Phases A and B. Returns the packed exports and per-entry packet counts.
fn prepare<O: Transferable>(
    target: &mut O,
    source: &O,
    lists: &TransferLists<'_>,
) -> Result<(Vec<O::Packet>, Vec<usize>), RemapError> {
    target.copy_and_permute(source, lists.num_same, lists.permute_to, lists.permute_from)?;

    let mut exports = Vec::new();
    let mut packets_per_lid = vec![0usize; lists.send_lids.len()];
    source.pack_and_prepare(lists.send_lids, &mut exports, &mut packets_per_lid)?;

    if let PacketLayout::Constant(k) = source.packet_layout() {
        let expected = k * lists.send_lids.len();
        if exports.len() != expected || packets_per_lid.iter().any(|&n| n != k) {
            return Err(RemapError::VariablePacketsUnsupported {
                expected,
                got: exports.len(),
            });
        }
    }
    Ok((exports, packets_per_lid))
}

/// Run one transfer along `lists`. Collective.
///
/// Local failures before the exchange (sizes, combine mode, packing) are agreed
/// on first, so every rank returns an error and no payload moves. The target
/// may already hold its locally copied entries when that happens.
pub fn transfer<O, C>(
    target: &mut O,
    source: &O,
    lists: TransferLists<'_>,
    mode: CombineMode,
    comm: &C,
    config: &ExchangeConfig,
) -> Result<(), RemapError>
where
    O: Transferable,
    C: Communicator,
{
    let prepared = check_preconditions(target, source, &lists, mode)
        .and_then(|()| prepare(target, source, &lists));
    agree_if(
        comm,
        config.collective_error_checks,
        prepared.as_ref().map(|_| ()).map_err(Clone::clone),
    )?;
    let (exports, packets_per_lid) = prepared?;

    let dist = lists.distributor;
    let (imports, import_counts) = match source.packet_layout() {
        PacketLayout::Constant(k) => {
            let imports = dist.execute(&exports, k, comm, config.tags.data)?;
            (imports, vec![k; lists.recv_lids.len()])
        }
        PacketLayout::Variable => {
            let counts: Vec<WireCount> = packets_per_lid.iter().map(|&n| WireCount::new(n)).collect();
            let import_counts: Vec<usize> = dist
                .execute(&counts, 1, comm, config.tags.sizes)?
                .iter()
                .map(WireCount::get)
                .collect();
            let imports =
                dist.execute_variable(&exports, &packets_per_lid, &import_counts, comm, config.tags.data)?;
            (imports, import_counts)
        }
    };
    log::trace!(
        "[transfer] rank {}: sent {} packets, received {} packets ({:?})",
        comm.rank(),
        exports.len(),
        imports.len(),
        mode
    );

    target.unpack_and_combine(lists.recv_lids, &imports, &import_counts, mode)
}

/// `do_import`/`do_export` for every [`Transferable`].
pub trait DistObjectExt: Transferable + Sized {
    /// Bring data from `source` into `self` along `pattern`. Collective.
    fn do_import<P, C>(&mut self, source: &Self, pattern: &P, mode: CombineMode, comm: &C) -> Result<(), RemapError>
    where
        P: RedistributionPattern,
        C: Communicator,
    {
        self.do_import_with_config(source, pattern, mode, comm, &ExchangeConfig::default())
    }

    fn do_import_with_config<P, C>(
        &mut self,
        source: &Self,
        pattern: &P,
        mode: CombineMode,
        comm: &C,
        config: &ExchangeConfig,
    ) -> Result<(), RemapError>
    where
        P: RedistributionPattern,
        C: Communicator,
    {
        let lists = pattern.plan().lists(pattern.import_direction());
        transfer(self, source, lists, mode, comm, config)
    }

    /// Send data from `source` into `self` along `pattern`; with an Import
    /// pattern this runs it backwards (target layout to source layout). Collective.
    fn do_export<P, C>(&mut self, source: &Self, pattern: &P, mode: CombineMode, comm: &C) -> Result<(), RemapError>
    where
        P: RedistributionPattern,
        C: Communicator,
    {
        self.do_export_with_config(source, pattern, mode, comm, &ExchangeConfig::default())
    }

    fn do_export_with_config<P, C>(
        &mut self,
        source: &Self,
        pattern: &P,
        mode: CombineMode,
        comm: &C,
        config: &ExchangeConfig,
    ) -> Result<(), RemapError>
    where
        P: RedistributionPattern,
        C: Communicator,
    {
        let lists = pattern.plan().lists(pattern.export_direction());
        transfer(self, source, lists, mode, comm, config)
    }
}

impl<T: Transferable> DistObjectExt for T {}
