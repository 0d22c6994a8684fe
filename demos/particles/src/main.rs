//! Particle demo — drives the column store end to end.
//!
//! Registers a handful of attributes, creates two archetypal tables (moving
//! and frozen particles), steps a tiny simulation that migrates particles
//! between the tables as they freeze and thaw, and defragments the churn
//! away at the end of every step.

use std::sync::Arc;

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use memdb_attr::{AttributeFlags, AttributeRegistry, FilterSet};
use memdb_db::Database;

#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Vec3 {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Parser)]
#[command(name = "particles", about = "Particle demo over the in-memory column store")]
struct Args {
    /// Number of particles to spawn
    #[arg(short, long, default_value_t = 1000)]
    count: usize,

    /// Number of simulation steps
    #[arg(short, long, default_value_t = 10)]
    steps: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "particles=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut registry = AttributeRegistry::new();
    let position = registry.register_pod(
        "Position",
        Vec3 {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        },
        AttributeFlags::NONE,
    );
    let velocity = registry.register_pod(
        "Velocity",
        Vec3 {
            x: 0.0,
            y: -1.0,
            z: 0.0,
        },
        AttributeFlags::NONE,
    );
    let frozen = registry.register_tag("Frozen", AttributeFlags::NONE);

    let mut db = Database::new(Arc::new(registry));
    let moving = db.create_table("moving_particles", &[position, velocity]);
    let still = db.create_table("frozen_particles", &[position, frozen]);

    for i in 0..args.count {
        let row = db.allocate_row(moving)?;
        db.set_value(
            moving,
            position,
            row,
            Vec3 {
                x: i as f32,
                y: 1.0 + (i % 20) as f32,
                z: 0.0,
            },
        )?;
    }
    info!(count = args.count, "spawned particles");

    let active = FilterSet::new(&[position, velocity], &[frozen]);

    for step in 0..args.steps {
        // Integrate every active particle.
        let dataset = db.query(&active);
        let mut landed = Vec::new();
        for view in &dataset {
            let table = view.table;
            for row in 0..view.num_rows {
                let mut pos: Vec3 = db.get_value(table, position, row)?;
                let vel: Vec3 = db.get_value(table, velocity, row)?;
                pos.x += vel.x;
                pos.y += vel.y;
                pos.z += vel.z;
                db.set_value(table, position, row, pos)?;
                if pos.y <= 0.0 {
                    landed.push((table, row));
                }
            }
        }

        // Landed particles freeze: they migrate to the frozen archetype.
        // Rows are compacted as we go, so migrate from the highest index
        // down to keep the remaining indices stable.
        landed.sort_by(|a, b| b.1.cmp(&a.1));
        let landed_count = landed.len();
        for (table, row) in landed {
            db.migrate_row(table, row, still)?;
        }

        let frozen_count = db.num_rows(still)?;
        info!(step, landed = landed_count, frozen = frozen_count, "stepped");
    }

    let reclaimed = db.defragment(moving)?.reclaimed;
    info!(
        moving = db.num_rows(moving)?,
        frozen = db.num_rows(still)?,
        reclaimed,
        "simulation finished"
    );

    Ok(())
}
