use galerkin::assembly::operators::LaplaceForm;
use galerkin::assembly::{AssemblyError, AssemblySettings, SystemAssembler};
use galerkin::element::LagrangeElement;
use galerkin::mesh::procedural::create_unit_square_uniform_tri_mesh_2d;
use galerkin::mesh::Mesh;
use galerkin::nalgebra::DVector;
use galerkin::partition::{
    run_in_process, CellPartition, Communicator, Ownership, PartitionedAssembler, SerialCommunicator,
};
use galerkin::proptest::{rectangular_uniform_quad_mesh_strategy, rectangular_uniform_tri_mesh_strategy};
use galerkin::space::{FunctionSpaceBuilder, MixedSpace};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn zero_mean_space(n: usize) -> MixedSpace<f64> {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(n));
    let field = FunctionSpaceBuilder::new(mesh, LagrangeElement::p2())
        .zero_mean()
        .build()
        .unwrap();
    MixedSpace::single(field)
}

fn constrained_space(n: usize) -> MixedSpace<f64> {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(n));
    let field = FunctionSpaceBuilder::new(mesh, LagrangeElement::p1())
        .dirichlet("left", |x, _| x.y)
        .build()
        .unwrap();
    MixedSpace::single(field)
}

fn sample_state(n: usize) -> DVector<f64> {
    DVector::from_fn(n, |i, _| f64::sin(0.7 * i as f64))
}

#[test]
fn contiguous_partition_covers_cells_and_dofs_once() {
    let space = zero_mean_space(3);
    let partitions = CellPartition::contiguous(&space, 4);
    assert_eq!(partitions.len(), 4);

    let sizes: Vec<_> = partitions.iter().map(|p| p.owned_cells().len()).collect();
    assert_eq!(sizes, vec![5, 5, 4, 4]);

    let mut cells = Vec::new();
    let mut dofs = Vec::new();
    for (rank, partition) in partitions.iter().enumerate() {
        assert_eq!(partition.rank(), rank);
        cells.extend_from_slice(partition.owned_cells());
        dofs.extend_from_slice(partition.owned_dofs());
    }
    assert_eq!(cells, (0..space.num_cells()).collect::<Vec<_>>());
    dofs.sort_unstable();
    assert_eq!(dofs, (0..space.system_size()).collect::<Vec<_>>());

    let multiplier = space.multiplier(0).unwrap();
    assert_eq!(partitions[0].ownership(multiplier), Ownership::Owned);
    assert_eq!(partitions[2].ownership(multiplier), Ownership::Ghost { owner: 0 });
}

#[test]
fn ghosts_are_owned_by_lower_ranks() {
    let space = constrained_space(4);
    let partitions = CellPartition::contiguous(&space, 3);

    assert!(partitions[0].ghost_dofs().is_empty());
    for partition in &partitions[1..] {
        assert!(!partition.ghost_dofs().is_empty());
        for &(dof, owner) in partition.ghost_dofs() {
            assert!(owner < partition.rank());
            assert_eq!(partitions[owner].ownership(dof), Ownership::Owned);
            assert_eq!(partition.ownership(dof), Ownership::Ghost { owner });
        }
    }

    let owned: BTreeSet<_> = partitions[0].owned_cells().iter().copied().collect();
    assert!(!partitions[0].ghost_cells().is_empty());
    for ghost in partitions[0].ghost_cells() {
        assert!(!owned.contains(ghost));
    }

    let last = partitions.last().unwrap();
    let untouched = (0..space.system_size()).find(|&dof| last.ownership(dof) == Ownership::Absent);
    assert!(untouched.is_some());
}

#[test]
fn in_process_collectives() {
    let results = run_in_process::<f64, _, _>(4, |communicator| {
        assert_eq!(communicator.size(), 4);
        let rank = communicator.rank() as f64;
        let mut values = vec![rank, 1.0];
        communicator.all_reduce_sum(&mut values);
        let gathered = communicator.gather(&[rank * 10.0]);
        (values, gathered)
    });

    assert_eq!(results.len(), 4);
    for (values, gathered) in results {
        assert_eq!(values, vec![6.0, 4.0]);
        assert_eq!(gathered, vec![vec![0.0], vec![10.0], vec![20.0], vec![30.0]]);
    }
}

#[test]
fn serial_communicator_is_trivial() {
    let communicator = SerialCommunicator;
    assert_eq!(<SerialCommunicator as Communicator<f64>>::rank(&communicator), 0);
    assert_eq!(<SerialCommunicator as Communicator<f64>>::size(&communicator), 1);
    let mut values = vec![1.0, 2.0];
    Communicator::<f64>::all_reduce_sum(&communicator, &mut values);
    assert_eq!(values, vec![1.0, 2.0]);
    assert_eq!(Communicator::<f64>::gather(&communicator, &[3.0]), vec![vec![3.0]]);
}

#[test]
fn single_part_assembly_is_identical_to_serial() {
    let space = zero_mean_space(2);
    let assembler = SystemAssembler::new(&space, LaplaceForm::new(), AssemblySettings::default()).unwrap();
    let partitions = CellPartition::contiguous(&space, 1);
    let partitioned = PartitionedAssembler::new(&assembler, &partitions[0], &SerialCommunicator);

    let u = sample_state(space.system_size());
    assert_eq!(partitioned.residual(&u).unwrap(), assembler.residual(&u).unwrap());
    assert_eq!(
        partitioned.jacobian(&u).unwrap().values(),
        assembler.jacobian(&u).unwrap().values()
    );
}

#[test]
fn partitioned_assembly_matches_serial_assembly() {
    let space = constrained_space(4);
    let form = LaplaceForm::<f64>::new().with_source(|x, _| x.x);
    let assembler = SystemAssembler::new(&space, form, AssemblySettings::default()).unwrap();
    let partitions = CellPartition::contiguous(&space, 3);
    let u = sample_state(space.system_size());

    let results = run_in_process::<f64, _, _>(3, |communicator| {
        let rank = communicator.rank();
        let partitioned = PartitionedAssembler::new(&assembler, &partitions[rank], &communicator);
        let residual = partitioned.constrained_residual(&u).unwrap();
        let jacobian = partitioned.constrained_jacobian(&u).unwrap();
        (residual, jacobian.values().to_vec())
    });

    let residual = assembler.constrained_residual(&u).unwrap();
    let jacobian = assembler.constrained_jacobian(&u).unwrap();
    for (partitioned_residual, partitioned_values) in &results {
        assert!((partitioned_residual - &residual).amax() < 1e-12);
        assert_eq!(partitioned_values.len(), jacobian.nnz());
        for (a, b) in partitioned_values.iter().zip(jacobian.values()) {
            assert!((a - b).abs() < 1e-12);
        }
    }
    // Every worker ends up with the same reduced values
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[test]
fn owned_entries_are_gathered_into_global_vector() {
    let space = zero_mean_space(3);
    let assembler = SystemAssembler::new(&space, LaplaceForm::new(), AssemblySettings::default()).unwrap();
    let partitions = CellPartition::contiguous(&space, 3);
    let n = space.system_size();

    let results = run_in_process::<f64, _, _>(3, |communicator| {
        let partition = &partitions[communicator.rank()];
        let partitioned = PartitionedAssembler::new(&assembler, partition, &communicator);
        let mut local = DVector::from_element(n, -1.0);
        for &dof in partition.owned_dofs() {
            local[dof] = dof as f64;
        }
        partitioned.gather_owned(&partitions, &local)
    });

    let expected = DVector::from_fn(n, |i, _| i as f64);
    for global in results {
        assert_eq!(global, expected);
    }
}

#[test]
fn failure_on_one_worker_is_reported_by_all() {
    let space = constrained_space(3);
    let assembler = SystemAssembler::new(&space, LaplaceForm::new(), AssemblySettings::default()).unwrap();
    let partitions = CellPartition::contiguous(&space, 3);

    let results = run_in_process::<f64, _, _>(3, |communicator| {
        let rank = communicator.rank();
        let partitioned = PartitionedAssembler::new(&assembler, &partitions[rank], &communicator);
        // Worker 1 passes a state of the wrong size
        let n = space.system_size() + usize::from(rank == 1);
        match partitioned.residual(&DVector::zeros(n)) {
            Ok(_) => "ok".to_string(),
            Err(AssemblyError::WorkerFailed { rank }) => format!("worker {}", rank),
            Err(AssemblyError::DimensionMismatch(_)) => "mismatch".to_string(),
            Err(other) => other.to_string(),
        }
    });

    assert_eq!(results, vec!["worker 1", "mismatch", "worker 1"]);
}

fn rectangular_mesh() -> impl Strategy<Value = Mesh<f64>> {
    prop_oneof![
        rectangular_uniform_tri_mesh_strategy(0.5, 8),
        rectangular_uniform_quad_mesh_strategy(0.5, 12)
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn partitioned_assembly_matches_serial_on_rectangular_meshes(
        mesh in rectangular_mesh(),
        num_parts in 1..=3usize,
        zero_mean in any::<bool>(),
    ) {
        let kind = mesh.cell_kind();
        let mut builder = FunctionSpaceBuilder::new(Arc::new(mesh), LagrangeElement::new(kind, 1));
        builder = if zero_mean {
            builder.zero_mean()
        } else {
            builder.dirichlet("left", |x, _| x.y)
        };
        let space = MixedSpace::single(builder.build().unwrap());
        let form = LaplaceForm::<f64>::new().with_source(|x, _| 1.0 + x.x);
        let assembler = SystemAssembler::new(&space, form, AssemblySettings::default()).unwrap();
        let partitions = CellPartition::contiguous(&space, num_parts);
        let u = sample_state(space.system_size());

        let owned_cells: usize = partitions.iter().map(|p| p.owned_cells().len()).sum();
        prop_assert_eq!(owned_cells, space.num_cells());

        let results = run_in_process::<f64, _, _>(num_parts, |communicator| {
            let partitioned = PartitionedAssembler::new(&assembler, &partitions[communicator.rank()], &communicator);
            let residual = partitioned.constrained_residual(&u).unwrap();
            let jacobian = partitioned.constrained_jacobian(&u).unwrap();
            (residual, jacobian.values().to_vec())
        });

        let residual = assembler.constrained_residual(&u).unwrap();
        let jacobian = assembler.constrained_jacobian(&u).unwrap();
        for (partitioned_residual, partitioned_values) in &results {
            prop_assert!((partitioned_residual - &residual).amax() < 1e-12);
            prop_assert_eq!(partitioned_values.len(), jacobian.nnz());
            for (a, b) in partitioned_values.iter().zip(jacobian.values()) {
                prop_assert!((a - b).abs() < 1e-12);
            }
        }
    }
}
