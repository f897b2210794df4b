use crate::infra::{ConfiguredIdentityProvider, InMemoryDirectory, Registration};
use chrono::{Duration, Utc};
use clap::Args;
use food_rescue::donations::{
    ClaimRequest, DirectoryService, DonationError, DonationService, EntityStore,
    IdentityProvider, ListingFilter, ListingId, ListingSubmission, MemoryEntityStore, NgoId,
};
use food_rescue::error::AppError;
use std::sync::{Arc, Barrier};
use std::thread;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// City the demo listing is published in.
    #[arg(long, default_value = "Durban")]
    pub(crate) city: String,
    /// Number of NGOs racing to claim the listing.
    #[arg(long, default_value_t = 8)]
    pub(crate) contenders: u64,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RaceOutcome {
    pub(crate) winners: Vec<NgoId>,
    pub(crate) conflicts: usize,
    pub(crate) failures: usize,
}

fn registration(name: String, city: &str) -> Registration {
    let contact_email = format!("{}@example.org", name.to_lowercase().replace(' ', "."));
    Registration {
        name,
        city: city.to_string(),
        contact_email,
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { city, contenders } = args;
    let contenders = contenders.max(1);

    let directory = Arc::new(InMemoryDirectory::default());
    let donor = directory
        .register_donor(registration("Harbour Fresh Market".to_string(), &city))
        .map_err(DonationError::from)?;
    let ngos = (1..=contenders)
        .map(|index| directory.register_ngo(registration(format!("Kitchen {index}"), &city)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(DonationError::from)?;

    let service = DonationService::new(
        Arc::new(MemoryEntityStore::new()),
        directory,
        Arc::new(ConfiguredIdentityProvider::default()),
    );

    println!("Food rescue demo ({city})");
    let listing = service.listings().create_listing(
        donor.id,
        ListingSubmission {
            title: "Unsold produce".to_string(),
            description: "Tomatoes, onions and leafy greens".to_string(),
            quantity: 30,
            unit: "kg".to_string(),
            expires_at: Utc::now() + Duration::hours(12),
            city: city.clone(),
        },
    )?;
    println!(
        "- {} published {} ({} {}) as {}",
        donor.name, listing.id, listing.quantity, listing.unit, listing.status
    );

    let open = service.search().search(&ListingFilter::in_city(&city))?;
    println!("- {} open listing(s) visible in {city}", open.len());

    let ngo_ids: Vec<NgoId> = ngos.iter().map(|ngo| ngo.id).collect();
    let outcome = race_for_listing(&service, listing.id, &ngo_ids);
    println!(
        "- {} NGOs raced: {} claim granted, {} rejected as conflicts, {} failed",
        ngo_ids.len(),
        outcome.winners.len(),
        outcome.conflicts,
        outcome.failures
    );

    let Some(winner) = outcome.winners.first() else {
        println!("  No claim was granted; listing stays open.");
        return Ok(());
    };
    println!("  Winner: {winner}");

    let open = service.search().search(&ListingFilter::in_city(&city))?;
    println!("- {} open listing(s) remain in {city}", open.len());

    let pickup = service.claims().confirm_pickup(listing.id)?;
    println!(
        "- Pickup confirmed: {} is {}, {} is {}",
        pickup.listing.id, pickup.listing.status, pickup.claim.id, pickup.claim.status
    );

    Ok(())
}

/// Submit one claim per NGO from separate threads released together.
pub(crate) fn race_for_listing<S, D, I>(
    service: &DonationService<S, D, I>,
    listing_id: ListingId,
    ngos: &[NgoId],
) -> RaceOutcome
where
    S: EntityStore + 'static,
    D: DirectoryService + 'static,
    I: IdentityProvider + 'static,
{
    let barrier = Barrier::new(ngos.len());

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = ngos
            .iter()
            .map(|&ngo_id| {
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    let result = service.claims().submit_claim(ClaimRequest {
                        listing_id,
                        ngo_id,
                        note: None,
                    });
                    (ngo_id, result)
                })
            })
            .collect();
        handles.into_iter().filter_map(|handle| handle.join().ok()).collect()
    });

    let mut outcome = RaceOutcome::default();
    for (ngo_id, result) in results {
        match result {
            Ok(_) => outcome.winners.push(ngo_id),
            Err(DonationError::Conflict(_)) => outcome.conflicts += 1,
            Err(_) => outcome.failures += 1,
        }
    }
    outcome
}
