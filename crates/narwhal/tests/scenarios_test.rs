use narwhal::{Command, LayoutOptions, ParticleSystem, Vector2, XorShift64Star};
use std::time::{Duration, Instant};

fn system(options: LayoutOptions) -> ParticleSystem {
    ParticleSystem::new(LayoutOptions {
        random_seed: Some(42),
        ..options
    })
    .unwrap()
}

fn position(sys: &ParticleSystem, label: &str) -> Vector2 {
    sys.node(sys.get_node(label).unwrap()).unwrap().position
}

fn centroid(sys: &ParticleSystem) -> Vector2 {
    let ps = sys.particles();
    let sum = ps.iter().fold(Vector2::ZERO, |acc, p| acc + p.position);
    sum / ps.len() as f64
}

#[test]
fn chain_of_three_settles_symmetrically() {
    let mut sys = system(LayoutOptions {
        stiffness: 500.0,
        repulsion: 10_000.0,
        friction: 0.1,
        dt: 0.01,
        theta: 0.0,
        ..Default::default()
    });
    sys.add_node("A", Some(Vector2::new(-3.0, 0.2)));
    sys.add_node("B", Some(Vector2::new(0.5, -0.1)));
    sys.add_node("C", Some(Vector2::new(2.5, 0.3)));
    sys.add_edge("A", "B", None);
    sys.add_edge("B", "C", None);

    let t0 = Instant::now();
    for i in 0..500 {
        sys.tick(t0 + Duration::from_millis(10 * i));
    }

    let (a, b, c) = (position(&sys, "A"), position(&sys, "B"), position(&sys, "C"));
    let ab = a.distance(b);
    let bc = b.distance(c);
    assert!((ab - bc).abs() < 0.05, "ab={ab} bc={bc}");

    let mid = (a + c) / 2.0;
    assert!(
        b.distance(mid) < 0.1 * a.distance(c),
        "B={b:?} is not between A={a:?} and C={c:?}"
    );
    assert!(ab > 1.0, "repulsion should stretch springs past rest length, ab={ab}");
}

#[test]
fn lone_particle_at_rest_stays_put() {
    let mut sys = system(LayoutOptions::default());
    sys.add_node("solo", Some(Vector2::ZERO));

    let out = sys.tick(Instant::now());
    assert_eq!(position(&sys, "solo"), Vector2::ZERO);
    assert_eq!(out.energy.sum, 0.0);
    assert_eq!(out.energy.max, 0.0);
    assert_eq!(out.energy.mean, 0.0);
    assert!(!out.degraded);
}

#[test]
fn empty_system_ticks_with_zero_energy() {
    let mut sys = system(LayoutOptions::default());
    let out = sys.tick(Instant::now());
    assert_eq!(out.energy.mean, 0.0);
    assert_eq!(out.energy.count, 0);
}

#[test]
fn exact_repulsion_keeps_the_centroid_from_wandering() {
    let mut sys = system(LayoutOptions {
        barnes_hut: false,
        ..Default::default()
    });
    let mut rng = XorShift64Star::new(9);
    let offset = Vector2::new(10.0, -6.0);
    for i in 0..30 {
        sys.add_node(&format!("n{i}"), Some(offset + rng.vector_in_square(5.0)));
    }
    for i in 0..30 {
        sys.add_edge(&format!("n{i}"), &format!("n{}", (i + 7) % 30), None);
    }

    let t0 = Instant::now();
    let mut last = centroid(&sys).magnitude();
    for i in 0..200 {
        sys.tick(t0 + Duration::from_millis(18 * i));
        let now = centroid(&sys).magnitude();
        assert!(now <= last + 1e-9, "centroid moved outward: {last} -> {now}");
        last = now;
    }
}

#[test]
fn approximate_repulsion_keeps_the_centroid_bounded() {
    let mut sys = system(LayoutOptions::default());
    let mut rng = XorShift64Star::new(13);
    for i in 0..80 {
        sys.add_node(&format!("n{i}"), Some(rng.vector_in_square(20.0)));
    }
    for i in 1..80 {
        sys.add_edge(&format!("n{}", i / 2), &format!("n{i}"), None);
    }

    let start = centroid(&sys);
    let t0 = Instant::now();
    for i in 0..300 {
        sys.tick(t0 + Duration::from_millis(18 * i));
        let drift = centroid(&sys).distance(start);
        assert!(drift < 1.0, "centroid drifted {drift} by tick {i}");
    }
}

#[test]
fn repeated_edge_between_existing_nodes_is_not_duplicated() {
    let mut sys = system(LayoutOptions::default());
    sys.add_node("a", Some(Vector2::ZERO));
    sys.add_node("b", Some(Vector2::new(1.0, 0.0)));

    let first = sys.add_edge("a", "b", Some(2.0)).unwrap();
    let second = sys.add_edge("a", "b", Some(5.0)).unwrap();
    assert_eq!(first, second);
    assert_eq!(sys.springs().len(), 1);
    assert_eq!(sys.springs()[0].rest_length, 5.0);

    // Direction matters for the duplicate check.
    let reverse = sys.add_edge("b", "a", None).unwrap();
    assert_ne!(reverse, first);
    assert_eq!(sys.springs().len(), 2);
}

#[test]
fn edge_creating_its_endpoints_skips_the_duplicate_check() {
    let mut sys = system(LayoutOptions::default());
    let created = sys.add_edge("x", "y", Some(3.0)).unwrap();
    assert_eq!(sys.particles().len(), 2);

    // Both endpoints exist now, so the second call finds the first spring.
    let again = sys.add_edge("x", "y", None).unwrap();
    assert_eq!(again, created);
    assert_eq!(sys.springs().len(), 1);
    assert_eq!(sys.springs()[0].rest_length, 3.0);

    // A new endpoint means a new spring even from an existing source.
    sys.add_edge("x", "z", None).unwrap();
    assert_eq!(sys.springs().len(), 2);
}

#[test]
fn nearest_on_an_empty_system_is_none() {
    let sys = system(LayoutOptions::default());
    assert!(sys.nearest(Vector2::new(10.0, 10.0)).is_none());
}

#[test]
fn nearest_skips_undefined_positions() {
    let mut sys = system(LayoutOptions {
        repulsion: 0.0,
        stiffness: 0.0,
        ..Default::default()
    });
    sys.add_node("a", Some(Vector2::new(-5.0, 0.0)));
    sys.add_node("b", Some(Vector2::new(5.0, 0.0)));
    sys.add_node("ghost", Some(Vector2::ZERO));
    sys.enqueue(Command::SetPosition {
        label: "ghost".into(),
        position: Vector2::UNDEFINED,
    });
    sys.tick(Instant::now());
    assert!(position(&sys, "ghost").is_degenerate());

    let b_screen = sys.to_screen(position(&sys, "b")).unwrap();
    let hit = sys.nearest(b_screen + Vector2::new(3.0, 4.0)).unwrap();
    assert_eq!(hit.label, "b");
    assert!((hit.distance - 5.0).abs() < 1e-9);

    // The ghost's last finite spot was the exact midpoint; it must never be returned.
    let mid = sys.to_screen(Vector2::ZERO).unwrap();
    let hit = sys.nearest(mid).unwrap();
    assert_ne!(hit.label, "ghost");
}

#[test]
fn nearest_works_before_the_first_tick() {
    let mut sys = system(LayoutOptions::default());
    sys.add_node("a", Some(Vector2::new(-5.0, 0.0)));
    sys.add_node("b", Some(Vector2::new(5.0, 0.0)));
    let hit = sys.nearest(Vector2::new(0.0, 0.0)).unwrap();
    assert_eq!(hit.label, "a");
}
