//! Small collectives built on [`Communicator::allgather`].
//!
//! `agree` is the error-agreement step every collective operation runs before
//! it moves payload: a process that hits a local error keeps it, and every
//! other process returns [`RemapError::PeerFailure`] from the same call.

use bytemuck::Pod;
use std::mem::size_of;

use crate::algs::communicator::Communicator;
use crate::algs::wire::decode_vec;
use crate::remap_error::RemapError;

/// Gather one `T` from every rank, in rank order.
pub fn allgather_pod<T: Pod, C: Communicator>(comm: &C, value: &T) -> Result<Vec<T>, RemapError> {
    let width = size_of::<T>();
    let mut raw = vec![0u8; width * comm.size()];
    comm.allgather(bytemuck::bytes_of(value), &mut raw)?;
    decode_vec(&raw).ok_or(RemapError::SizeMismatch {
        what: "allgather record",
        expected: width * comm.size(),
        got: raw.len(),
    })
}

/// Collective error agreement.
pub fn agree<C: Communicator>(comm: &C, local: Result<(), RemapError>) -> Result<(), RemapError> {
    if comm.is_no_comm() {
        return local;
    }
    let mut flags = vec![0u8; comm.size()];
    comm.allgather(&[u8::from(local.is_err())], &mut flags)?;
    local?;
    match flags.iter().position(|&f| f != 0) {
        Some(rank) => {
            log::debug!(
                "[collective] rank {} aborting: rank {} reported an error",
                comm.rank(),
                rank
            );
            Err(RemapError::PeerFailure { rank })
        }
        None => Ok(()),
    }
}

/// [`agree`] when `enabled`, otherwise return the local result unchanged.
pub fn agree_if<C: Communicator>(
    comm: &C,
    enabled: bool,
    local: Result<(), RemapError>,
) -> Result<(), RemapError> {
    if enabled { agree(comm, local) } else { local }
}

/// True on every rank iff `flag` holds on every rank.
pub fn all_ranks<C: Communicator>(comm: &C, flag: bool) -> Result<bool, RemapError> {
    let mut flags = vec![0u8; comm.size()];
    comm.allgather(&[u8::from(flag)], &mut flags)?;
    Ok(flags.iter().all(|&f| f != 0))
}
