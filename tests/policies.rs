use ntuple_2048::engine::{Board, BoardSize, Move};
use ntuple_2048::learning::{play_game, TdLearner, DEFAULT_ALPHA};
use ntuple_2048::network::NTupleNetwork;
use ntuple_2048::policy::{action_values, Expectimax, ExpectimaxConfig, Greedy, MovePolicy};
use rand::{rngs::StdRng, SeedableRng};

fn trained(size: BoardSize, episodes: usize, seed: u64) -> NTupleNetwork {
    let mut learner = TdLearner::new(NTupleNetwork::light(size), DEFAULT_ALPHA);
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..episodes {
        learner.train_episode(&mut rng);
    }
    learner.into_network()
}

fn midgame_boards(size: BoardSize, n: usize, seed: u64) -> Vec<Board> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let mut b = Board::new(size, &mut rng);
            for _ in 0..3 {
                b = b.with_random_tile(&mut rng).unwrap_or(b);
            }
            b
        })
        .collect()
}

#[test]
fn depth_zero_expectimax_agrees_with_greedy() {
    for size in [BoardSize::Three, BoardSize::Four] {
        let net = trained(size, 20, 1);
        let mut greedy = Greedy::new(&net);
        let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth: 0, ..Default::default() }, 2);
        for b in midgame_boards(size, 100, 3) {
            assert_eq!(ex.select_move(&b), greedy.select_move(&b), "{b:?}");
        }
    }
}

#[test]
fn policies_are_interchangeable() {
    let net = trained(BoardSize::Four, 10, 4);
    let mut policies: Vec<Box<dyn MovePolicy + '_>> = vec![
        Box::new(Greedy::new(&net)),
        Box::new(Expectimax::seeded(&net, ExpectimaxConfig { depth: 2, sample_cap: 4 }, 6)),
    ];
    let mut names = Vec::new();
    for policy in policies.iter_mut() {
        let mut rng = StdRng::seed_from_u64(12);
        let result = play_game(policy, BoardSize::Four, &mut rng);
        assert!(result.moves > 0);
        assert!(!result.board.can_move());
        names.push(policy.name());
    }
    assert_eq!(names, vec!["greedy".to_string(), "expectimax-d2".to_string()]);
}

#[test]
fn expectimax_only_picks_legal_moves() {
    let net = trained(BoardSize::Four, 10, 5);
    let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth: 3, sample_cap: 3 }, 8);
    for b in midgame_boards(BoardSize::Four, 20, 9) {
        let legal = action_values(&net, &b);
        match ex.select_move(&b) {
            Some(dir) => assert!(legal[dir.index()].is_some()),
            None => assert_eq!(legal, [None; 4]),
        }
    }
}

#[test]
fn stuck_boards_yield_no_move() {
    let net = NTupleNetwork::light(BoardSize::Three);
    let stuck = Board::from_values(BoardSize::Three, &[2, 4, 2, 4, 2, 4, 2, 4, 2]).unwrap();
    assert!(!stuck.can_move());
    assert_eq!(Greedy::new(&net).select_move(&stuck), None);
    let mut ex = Expectimax::seeded(&net, ExpectimaxConfig::default(), 0);
    assert_eq!(ex.select_move(&stuck), None);
    assert!(Move::ALL.iter().all(|&d| !stuck.shift(d).moved));
}

#[test]
fn boards_of_another_size_get_no_move() {
    let net = trained(BoardSize::Four, 5, 7);
    let mut greedy = Greedy::new(&net);
    let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth: 2, sample_cap: 4 }, 3);
    for size in [BoardSize::Three, BoardSize::Five] {
        for b in midgame_boards(size, 10, 15) {
            assert!(b.can_move());
            assert!(greedy.try_select_move(&b).is_err());
            assert!(ex.try_select_move(&b).is_err());
            assert_eq!(greedy.select_move(&b), None);
            assert_eq!(ex.select_move(&b), None);
        }
    }
}
