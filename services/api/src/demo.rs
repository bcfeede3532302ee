use crate::infra::{
    build_providers, EvidenceFixtures, InMemoryApplicationRepository, LogNotificationSink,
    PhotoFixture, SceneFixture,
};
use chrono::{DateTime, TimeZone, Utc};
use clap::{Args, ValueEnum};
use solar_verify::config::VerificationConfig;
use solar_verify::error::AppError;
use solar_verify::workflows::verification::checks::SunPosition;
use solar_verify::workflows::verification::{
    Coordinates, EvidenceRefs, InitialApplication, InstallationFacts, OwnerId, PipelineOutcome,
    VerificationService,
};
use std::sync::Arc;

const WIDE_PHOTO: &str = "uploads/demo/rooftop-wide.jpg";
const SERIAL_PHOTO: &str = "uploads/demo/serial-closeup.jpg";

/// Early-morning sun over the demo site at the capture time.
const DEMO_SUN: SunPosition = SunPosition {
    azimuth: 97.0,
    elevation: 12.0,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum DemoScenario {
    /// Evidence consistent with the declaration; expected to auto-approve
    #[default]
    Genuine,
    /// No post-installation imagery; expected to land in manual review
    Borderline,
    /// Evidence contradicting the declaration; expected to auto-reject
    Suspicious,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evidence scenario to run through the pipeline
    #[arg(long, value_enum, default_value_t = DemoScenario::Genuine)]
    pub(crate) scenario: DemoScenario,
}

fn demo_site() -> Coordinates {
    Coordinates {
        latitude: 12.9716,
        longitude: 77.5946,
    }
}

fn capture_time() -> Result<DateTime<Utc>, AppError> {
    Utc.with_ymd_and_hms(2025, 3, 14, 6, 30, 0)
        .single()
        .ok_or_else(|| {
            AppError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid demo capture time",
            ))
        })
}

fn seed_fixtures(scenario: DemoScenario) -> Result<EvidenceFixtures, AppError> {
    let site = demo_site();
    let captured_at = capture_time()?;
    let sun_azimuth = DEMO_SUN.azimuth;
    let fixtures = EvidenceFixtures::default();
    fixtures.register_sun(site, DEMO_SUN);

    let (photo_offset, shadow_angle, serials, scene) = match scenario {
        DemoScenario::Genuine => (
            0.0002,
            sun_azimuth + 3.0,
            vec!["SERIAL-123456", "SERIAL-987654"],
            SceneFixture {
                pre_install: Some(0),
                post_install: Some(10),
            },
        ),
        DemoScenario::Borderline => (
            0.0002,
            sun_azimuth + 4.0,
            vec!["SERIAL-123456"],
            SceneFixture {
                pre_install: Some(0),
                post_install: None,
            },
        ),
        DemoScenario::Suspicious => (
            0.05,
            sun_azimuth + 95.0,
            vec!["FAKE-000001"],
            SceneFixture {
                pre_install: Some(4),
                post_install: Some(0),
            },
        ),
    };

    fixtures.register_photo(
        WIDE_PHOTO,
        PhotoFixture {
            gps: Some(Coordinates {
                latitude: site.latitude + photo_offset,
                longitude: site.longitude,
            }),
            captured_at: Some(captured_at),
            shadow_angle: Some(shadow_angle),
            serials: Vec::new(),
        },
    );
    fixtures.register_photo(
        SERIAL_PHOTO,
        PhotoFixture {
            serials: serials.into_iter().map(str::to_string).collect(),
            ..PhotoFixture::default()
        },
    );
    fixtures.register_scene(site, scene);
    Ok(fixtures)
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { scenario } = args;
    let config = VerificationConfig::default();
    let fixtures = seed_fixtures(scenario)?;
    let notifier = Arc::new(LogNotificationSink::default());
    let service = Arc::new(VerificationService::new(
        Arc::new(InMemoryApplicationRepository::default()),
        notifier.clone(),
        build_providers(&config, &fixtures),
        config.pipeline,
    ));
    let owner = OwnerId("demo-owner".to_string());

    println!("Rooftop solar verification demo ({scenario:?})");
    let application = service.create_initial(
        owner.clone(),
        InitialApplication {
            facts: InstallationFacts {
                address: "14 MG Road, Bengaluru".to_string(),
                coordinates: demo_site(),
                system_capacity_kw: 5.4,
                declared_panel_count: 10,
            },
        },
    )?;
    println!(
        "- created {} ({})",
        application.id,
        application.status_view().status
    );

    let ticket = service.begin_verification(
        &owner,
        &application.id,
        Some(demo_site()),
        EvidenceRefs {
            wide_rooftop_photo: WIDE_PHOTO.to_string(),
            serial_number_photo: SERIAL_PHOTO.to_string(),
            inverter_photo: None,
        },
    )?;
    println!("- verification attempt {} started", ticket.attempt);

    match service.run_pipeline(ticket).await {
        PipelineOutcome::Completed { status, .. } => println!("- pipeline finished: {status}"),
        other => println!("- pipeline did not settle: {other:?}"),
    }

    let report = service.report(&owner, &application.id)?;
    println!("\nChecks");
    for result in report.checks.results() {
        println!(
            "  - {:<22} {:.2}  {}",
            result.kind().label(),
            result.score(),
            result.reasoning()
        );
    }
    println!("\nConfidence {:.4} -> {}", report.confidence_score, report.decision.label());
    println!("{}", report.reasoning);

    if let Some(energy) = service.get(&owner, &application.id)?.expected_energy {
        println!(
            "Expected generation: {:.0} kWh/year",
            energy.expected_annual_kwh
        );
    }
    for notification in notifier.sent() {
        println!("\nNotification -> {}: {}", notification.recipient.0, notification.body);
    }

    let rendered = serde_json::to_string_pretty(&report)?;
    println!("\nReport\n{rendered}");

    Ok(())
}
