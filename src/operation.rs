//! The closed set of operations a worker can be observed doing.
//!
//! Every wrapped primitive reports one [`OperationKind`]. The numeric code is what travels
//! through the status table, so the order of the table below is part of the slot encoding.

macro_rules! operation_kinds {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// A distributed operation, or one of the lifecycle markers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum OperationKind {
            $($variant),+
        }

        impl OperationKind {
            /// Every kind, in code order.
            pub const ALL: &'static [OperationKind] = &[$(OperationKind::$variant),+];

            /// Name shown in the dashboard's *What* column.
            pub fn name(self) -> &'static str {
                match self {
                    $(OperationKind::$variant => $name),+
                }
            }
        }
    };
}

operation_kinds! {
    Uninitialized => "-",
    Initialized => "Init",
    Finalized => "Finalize",
    Abort => "Abort",
    Wtime => "Wtime",

    Send => "Send",
    Bsend => "Bsend",
    Rsend => "Rsend",
    Ssend => "Ssend",
    Isend => "Isend",
    Ibsend => "Ibsend",
    Irsend => "Irsend",
    Issend => "Issend",
    SendInit => "Send_init",
    BsendInit => "Bsend_init",
    RsendInit => "Rsend_init",
    SsendInit => "Ssend_init",
    Recv => "Recv",
    Irecv => "Irecv",
    RecvInit => "Recv_init",
    Sendrecv => "Sendrecv",
    SendrecvReplace => "Sendrecv_replace",
    Probe => "Probe",
    Iprobe => "Iprobe",
    GetCount => "Get_count",

    Barrier => "Barrier",
    Bcast => "Bcast",
    Gather => "Gather",
    Gatherv => "Gatherv",
    Scatter => "Scatter",
    Scatterv => "Scatterv",
    Allgather => "Allgather",
    Allgatherv => "Allgatherv",
    Alltoall => "Alltoall",
    Alltoallv => "Alltoallv",
    Reduce => "Reduce",
    Allreduce => "Allreduce",
    ReduceScatter => "Reduce_scatter",
    ReduceScatterBlock => "Reduce_scatter_block",
    Scan => "Scan",
    Exscan => "Exscan",
    Ibarrier => "Ibarrier",
    Ibcast => "Ibcast",
    Igather => "Igather",
    Igatherv => "Igatherv",
    Iscatter => "Iscatter",
    Iscatterv => "Iscatterv",
    Iallgather => "Iallgather",
    Iallgatherv => "Iallgatherv",
    Ialltoall => "Ialltoall",
    Ialltoallv => "Ialltoallv",
    Ireduce => "Ireduce",
    Iallreduce => "Iallreduce",
    IreduceScatter => "Ireduce_scatter",
    IreduceScatterBlock => "Ireduce_scatter_block",
    OpCreate => "Op_create",
    OpFree => "Op_free",

    Put => "Put",
    Get => "Get",
    Accumulate => "Accumulate",
    WinCreate => "Win_create",
    WinAllocate => "Win_allocate",
    WinCreateDynamic => "Win_create_dynamic",
    WinAttach => "Win_attach",
    WinDetach => "Win_detach",
    WinFree => "Win_free",
    GetAddress => "Get_address",

    TypeCommit => "Type_commit",
    TypeContiguous => "Type_contiguous",
    TypeVector => "Type_vector",
    TypeIndexed => "Type_indexed",
    TypeCreateHvector => "Type_create_hvector",
    TypeCreateHindexed => "Type_create_hindexed",
    TypeCreateHindexedBlock => "Type_create_hindexed_block",
    TypeCreateIndexedBlock => "Type_create_indexed_block",
    TypeCreateStruct => "Type_create_struct",
    TypeCreateSubarray => "Type_create_subarray",
    TypeGetExtent => "Type_get_extent",
    TypeFree => "Type_free",

    CommRank => "Comm_rank",
    CommSize => "Comm_size",
    CommSplit => "Comm_split",
    CommCreate => "Comm_create",
    CommGroup => "Comm_group",
    CommGetName => "Comm_get_name",
    CommSetName => "Comm_set_name",
    CommGetParent => "Comm_get_parent",
    CommSpawn => "Comm_spawn",
    GroupRank => "Group_rank",
    GroupSize => "Group_size",
    GroupIncl => "Group_incl",
    GroupUnion => "Group_union",
    GroupIntersection => "Group_intersection",
    GroupDifference => "Group_difference",
    CartCreate => "Cart_create",
    CartCoords => "Cart_coords",
    CartGet => "Cart_get",
    CartShift => "Cart_shift",
    DimsCreate => "Dims_create",

    Wait => "Wait",
    Waitall => "Waitall",
    Waitany => "Waitany",
    Waitsome => "Waitsome",
    Test => "Test",
    Testall => "Testall",
    Testany => "Testany",
    Testsome => "Testsome",
    TestCancelled => "Test_cancelled",
    Cancel => "Cancel",
    Start => "Start",
    Startall => "Startall",
}

impl OperationKind {
    /// Code stored in a status slot.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Inverse of [`code`](Self::code). `None` for codes no kind uses.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// The synchronous-mode counterpart of a send-family operation.
    ///
    /// Blocking sends map to `Ssend`, non-blocking sends to `Issend` and persistent sends to
    /// `Ssend_init`. Everything else, including the synchronous forms themselves, maps to
    /// itself.
    pub fn synchronous_counterpart(self) -> Self {
        use OperationKind::*;
        match self {
            Send | Bsend | Rsend => Ssend,
            Isend | Ibsend | Irsend => Issend,
            SendInit | BsendInit | RsendInit => SsendInit,
            other => other,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_covers_all() {
        for (i, kind) in OperationKind::ALL.iter().enumerate() {
            assert_eq!(kind.code() as usize, i);
            assert_eq!(OperationKind::from_code(kind.code()), Some(*kind));
        }
        assert_eq!(OperationKind::from_code(OperationKind::ALL.len() as u32), None);
        assert_eq!(OperationKind::from_code(u32::MAX), None);
    }

    #[test]
    fn test_lifecycle_names() {
        assert_eq!(OperationKind::Uninitialized.name(), "-");
        assert_eq!(OperationKind::Initialized.name(), "Init");
        assert_eq!(OperationKind::Finalized.name(), "Finalize");
        assert_eq!(OperationKind::Ssend.to_string(), "Ssend");
    }

    #[test]
    fn test_synchronous_counterpart() {
        assert_eq!(OperationKind::Send.synchronous_counterpart(), OperationKind::Ssend);
        assert_eq!(OperationKind::Bsend.synchronous_counterpart(), OperationKind::Ssend);
        assert_eq!(OperationKind::Isend.synchronous_counterpart(), OperationKind::Issend);
        assert_eq!(
            OperationKind::RsendInit.synchronous_counterpart(),
            OperationKind::SsendInit
        );
        assert_eq!(OperationKind::Ssend.synchronous_counterpart(), OperationKind::Ssend);
        assert_eq!(OperationKind::Recv.synchronous_counterpart(), OperationKind::Recv);
    }
}
