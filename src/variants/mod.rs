mod forkjoin;
mod spmd;
mod distributed;

pub(crate) use forkjoin::ForkJoin;
pub(crate) use spmd::Spmd;
pub(crate) use distributed::Distributed;
