#[cfg(test)]
mod tests {
    use location_fingerprint::utility::*;
    use location_fingerprint::*;
    use rand::rngs::StdRng;
    use rand::*;
    use trajectory_grid::*;

    const GRID: u32 = 30;

    fn c(x: i32, y: i32) -> Cell {
        Cell::new(x, y)
    }

    /// Walks that mostly keep one heading, so the corpus has real structure.
    fn random_walk(rng: &mut StdRng, len: usize) -> Trajectory {
        let max = GRID as i32 - 1;
        let heading = [(1, 0), (0, 1), (-1, 0), (0, -1)][rng.random_range(0..4)];
        let mut cell = c(rng.random_range(0..=max), rng.random_range(0..=max));
        let mut cells = Vec::with_capacity(len);
        for _ in 0..len {
            cells.push(cell);
            let (dx, dy) = if rng.random_bool(0.7) {
                heading
            } else {
                (rng.random_range(-1..=1), rng.random_range(-1..=1))
            };
            cell = c((cell.x + dx).clamp(0, max), (cell.y + dy).clamp(0, max));
        }
        Trajectory::from_cells(cells)
    }

    fn city(seed: u64) -> (Vec<Trajectory>, CorrelationModel) {
        let mut rng = StdRng::seed_from_u64(seed);
        let data: Vec<Trajectory> = (0..300).map(|_| random_walk(&mut rng, 60)).collect();
        let grid = GridConfig::with_size(GRID).unwrap();
        let model = CorrelationModel::new(grid, data.iter().map(Trajectory::cells)).unwrap();
        (data, model)
    }

    fn diagonal() -> (Trajectory, CorrelationModel) {
        let trajectory = Trajectory::from_cells([c(0, 0), c(1, 1), c(2, 2)]);
        let grid = GridConfig::with_size(3).unwrap();
        let corpus = vec![trajectory.clone(); 5];
        let model = CorrelationModel::new(grid, corpus.iter().map(Trajectory::cells)).unwrap();
        (trajectory, model)
    }

    #[test]
    fn diagonal_corpus_scenario() {
        let (trajectory, model) = diagonal();
        assert_eq!(model.get_transition(c(0, 0)).as_slice(), &[(c(1, 1), 1.0)]);

        let config = FingerprintConfig::new(1.0).with_tau(0.1);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let fp = fingerprint(&mut rng, &trajectory, &model, &config).unwrap();
            assert_eq!(fp.flags, vec![true; 3]);
            assert_eq!(fp.embedding_rate(), 1.0);
        }
    }

    #[test]
    fn detection_scenario() {
        let parties = [
            Trajectory::from_cells([c(0, 0)]),
            Trajectory::from_cells([c(1, 0)]),
            Trajectory::from_cells([c(2, 2)]),
        ];
        let detection = similarity_detection(&parties[2], &parties).unwrap();
        assert_eq!(detection.party, 2);
        assert_eq!(detection.scores, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn copies_stay_on_the_model() {
        let (data, model) = city(1);
        let mut rng = StdRng::seed_from_u64(2);
        let config = FingerprintConfig::new(0.3);

        for truth in data.iter().take(20) {
            let fp = fingerprint(&mut rng, truth, &model, &config).unwrap();
            assert_eq!(fp.trajectory.len(), truth.len());
            assert!(fp.trajectory.validate(model.grid()).is_ok());

            for ((a, b), flag) in truth.iter().zip(fp.trajectory.iter()).zip(&fp.flags) {
                assert_eq!(a.timestamp, b.timestamp);
                assert_eq!(a.cell != b.cell, *flag);
            }
        }
    }

    #[test]
    fn exact_leak_is_traced() {
        let (data, model) = city(3);
        let mut rng = StdRng::seed_from_u64(4);
        let config = FingerprintConfig::new(0.5);

        for truth in data.iter().take(10) {
            let parties: Vec<Trajectory> = (0..8)
                .map(|_| fingerprint(&mut rng, truth, &model, &config).unwrap().trajectory)
                .collect();
            let leaker = rng.random_range(0..parties.len());
            let detection = similarity_detection(&parties[leaker], &parties).unwrap();
            assert!((detection.scores[leaker] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn collusion_on_identical_copies() {
        let (data, model) = city(5);
        let mut rng = StdRng::seed_from_u64(6);
        let copies = vec![&data[0]; 4];

        assert_eq!(&majority_collusion_attack(&mut rng, &copies).unwrap(), copies[0]);
        let attacked = Attack::MajorityCollusion { colluders: 4 }
            .apply(&mut rng, &model, &copies)
            .unwrap();
        assert_eq!(&attacked, copies[0]);
    }

    #[test]
    fn attacks_keep_shape() {
        let (data, model) = city(7);
        let mut rng = StdRng::seed_from_u64(8);
        let config = FingerprintConfig::new(0.4);
        let copies: Vec<Trajectory> = (0..3)
            .map(|_| fingerprint(&mut rng, &data[0], &model, &config).unwrap().trajectory)
            .collect();

        let attacks = [
            Attack::RandomDistortion { ratio: 0.5 },
            Attack::Correlation {
                tau: 0.01,
                ratio: 0.8,
                reference: ReferencePoint::Attacked,
                scale: DEFAULT_JITTER_SCALE,
            },
            Attack::MajorityCollusion { colluders: 3 },
            Attack::ProbabilisticCollusion {
                colluders: 3,
                p_estimate: 0.4,
                tau: 0.01,
                ratio: 0.8,
            },
        ];
        for attack in attacks {
            let attacked = attack.apply(&mut rng, &model, &copies).unwrap();
            assert_eq!(attacked.len(), data[0].len(), "{attack:?}");
            let times = |t: &Trajectory| t.iter().map(|p| p.timestamp).collect::<Vec<_>>();
            assert_eq!(times(&attacked), times(&data[0]));
        }
    }

    #[test]
    fn pipeline_from_json_configs() {
        let (data, model) = city(9);
        let fp: FingerprintConfig = serde_json::from_str(r#"{"ratio": 0.5}"#).unwrap();
        let attack: Attack =
            serde_json::from_str(r#"{"kind": "random_distortion", "ratio": 0.2}"#).unwrap();
        let eval: EvaluationConfig = serde_json::from_str(
            r#"{
                "trial_count": 4,
                "sub_trial_count": 5,
                "trajectory_count": 3,
                "party_count": 8,
                "trajectory_length": 50,
                "seed": 42
            }"#,
        )
        .unwrap();

        let accuracy = evaluate_detection_accuracy(&data, &model, &fp, &attack, &eval).unwrap();
        assert!(accuracy > 0.5, "accuracy {accuracy}");
        assert_eq!(
            evaluate_detection_accuracy(&data, &model, &fp, &attack, &eval),
            Ok(accuracy)
        );
    }

    #[test]
    fn fingerprinting_costs_little_utility() {
        let (data, model) = city(11);
        let mut rng = StdRng::seed_from_u64(12);
        let sample: Vec<Trajectory> = data.iter().take(50).cloned().collect();
        let marked: Vec<Trajectory> = sample
            .iter()
            .map(|t| {
                fingerprint(&mut rng, t, &model, &FingerprintConfig::new(0.1))
                    .unwrap()
                    .trajectory
            })
            .collect();

        let area = area_query_error(&mut rng, &sample, &marked, model.grid(), 100).unwrap();
        let pattern = pattern_query_error(&mut rng, &sample, &marked, &model, 2, 100).unwrap();
        let diameter = diameter_error(&sample, &marked, DEFAULT_BIN_COUNT).unwrap();
        assert!(area < 0.5, "area {area}");
        assert!(pattern.is_finite());
        assert!((0.0..=1.0).contains(&diameter));

        let coarse = |dataset: &[Trajectory]| {
            dataset.iter().map(|t| t.project(GRID, 10)).collect::<Vec<_>>()
        };
        let grid = GridConfig::with_size(10).unwrap();
        let popularity =
            popularity_correlation(&coarse(&sample), &coarse(&marked), &grid).unwrap();
        assert!(popularity > 0.5, "popularity {popularity}");
    }

    #[test]
    fn coarser_grid_projection() {
        let (data, _) = city(13);
        let projected: Vec<Trajectory> = data.iter().map(|t| t.project(GRID, 10)).collect();
        let grid = GridConfig::with_size(10).unwrap();
        assert!(projected.iter().all(|t| t.validate(&grid).is_ok()));
        assert!(CorrelationModel::new(grid, projected.iter().map(Trajectory::cells)).is_ok());
    }
}
