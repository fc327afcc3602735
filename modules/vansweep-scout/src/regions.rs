//! Compile-time reference table of UK postcode areas with density/activity
//! classification and coordinates. Loaded once at startup, read-only after.

use vansweep_common::Level::{High, Low, Medium};
use vansweep_common::Region;

macro_rules! region {
    ($code:literal, $city:literal, $region:literal, $density:expr, $activity:expr, $lat:literal, $lon:literal) => {
        Region {
            code: $code,
            city: $city,
            region_name: $region,
            density: $density,
            activity: $activity,
            lat: $lat,
            lon: $lon,
        }
    };
}

/// The full reference table. Density reflects population; activity reflects
/// commercial/trade volume (where vans actually get listed).
pub fn reference_regions() -> Vec<Region> {
    vec![
        // Major cities
        region!("SW1A", "London", "London", High, High, 51.5074, -0.1278),
        region!("M1", "Manchester", "Greater Manchester", High, High, 53.4808, -2.2426),
        region!("B1", "Birmingham", "West Midlands", High, High, 52.4862, -1.8904),
        region!("G1", "Glasgow", "Scotland", High, High, 55.8642, -4.2518),
        region!("LS1", "Leeds", "West Yorkshire", High, High, 53.8008, -1.5491),
        region!("EH1", "Edinburgh", "Scotland", High, Medium, 55.9533, -3.1883),
        region!("L1", "Liverpool", "Merseyside", High, High, 53.4084, -2.9916),
        region!("S1", "Sheffield", "South Yorkshire", High, High, 53.3811, -1.4701),
        region!("BS1", "Bristol", "Somerset", High, High, 51.4545, -2.5879),
        region!("NE1", "Newcastle", "Tyne and Wear", High, Medium, 54.9783, -1.6178),
        // Commercial and industrial hubs
        region!("IG1", "Ilford", "Greater London", High, High, 51.5590, 0.0819),
        region!("DA1", "Dartford", "Kent", Medium, High, 51.4461, 0.2056),
        region!("RM1", "Romford", "Greater London", High, High, 51.5754, 0.1827),
        region!("UB1", "Southall", "Greater London", High, High, 51.5106, -0.3756),
        region!("CR0", "Croydon", "Greater London", High, High, 51.3762, -0.0982),
        region!("WD1", "Watford", "Hertfordshire", Medium, High, 51.6565, -0.3973),
        region!("SL1", "Slough", "Berkshire", Medium, High, 51.5105, -0.5950),
        region!("MK1", "Milton Keynes", "Buckinghamshire", Medium, High, 52.0406, -0.7594),
        region!("NN1", "Northampton", "Northamptonshire", Medium, High, 52.2405, -0.9027),
        region!("CV1", "Coventry", "West Midlands", Medium, High, 52.4068, -1.5197),
        // Regional centres for geographic spread
        region!("TR1", "Truro", "Cornwall", Low, Low, 50.2632, -5.0510),
        region!("EX1", "Exeter", "Devon", Medium, Medium, 50.7184, -3.5339),
        region!("BA1", "Bath", "Somerset", Medium, Low, 51.3758, -2.3599),
        region!("GL1", "Gloucester", "Gloucestershire", Medium, Medium, 51.8642, -2.2382),
        region!("HR1", "Hereford", "Herefordshire", Low, Medium, 52.0567, -2.7150),
        region!("SY1", "Shrewsbury", "Shropshire", Low, Medium, 52.7077, -2.7531),
        region!("ST1", "Stoke-on-Trent", "Staffordshire", Medium, Medium, 53.0027, -2.1794),
        region!("DE1", "Derby", "Derbyshire", Medium, High, 52.9225, -1.4746),
        region!("NG1", "Nottingham", "Nottinghamshire", High, High, 52.9548, -1.1581),
        region!("PE1", "Peterborough", "Cambridgeshire", Medium, High, 52.5695, -0.2405),
        // Scotland
        region!("AB1", "Aberdeen", "Scotland", Medium, High, 57.1497, -2.0943),
        region!("DD1", "Dundee", "Scotland", Medium, Medium, 56.4620, -2.9707),
        region!("FK1", "Falkirk", "Scotland", Medium, High, 56.0018, -3.7839),
        region!("KY1", "Kirkcaldy", "Scotland", Medium, Medium, 56.1132, -3.1563),
        // Wales
        region!("CF1", "Cardiff", "Wales", High, Medium, 51.4816, -3.1791),
        region!("SA1", "Swansea", "Wales", Medium, Medium, 51.6214, -3.9436),
        region!("NP1", "Newport", "Wales", Medium, Medium, 51.5842, -2.9977),
        // Northern Ireland
        region!("BT1", "Belfast", "Northern Ireland", High, Medium, 54.5973, -5.9301),
        // Mixed-density south east
        region!("OX1", "Oxford", "Oxfordshire", Medium, Low, 51.7520, -1.2577),
        region!("CB1", "Cambridge", "Cambridgeshire", Medium, Low, 52.2053, 0.1218),
        region!("RG1", "Reading", "Berkshire", Medium, Medium, 51.4543, -0.9781),
        region!("GU1", "Guildford", "Surrey", Medium, Medium, 51.2362, -0.5704),
        region!("ME1", "Rochester", "Kent", Medium, Medium, 51.3886, 0.5041),
        region!("CT1", "Canterbury", "Kent", Medium, Low, 51.2802, 1.0789),
        region!("TN1", "Tunbridge Wells", "Kent", Medium, Low, 51.1328, 0.2634),
        region!("BN1", "Brighton", "East Sussex", Medium, Low, 50.8225, -0.1372),
        region!("PO1", "Portsmouth", "Hampshire", Medium, Medium, 50.8198, -1.0880),
        region!("SO1", "Southampton", "Hampshire", Medium, High, 50.9097, -1.4044),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let regions = reference_regions();
        let mut codes: Vec<&str> = regions.iter().map(|r| r.code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), regions.len());
    }

    #[test]
    fn coordinates_are_inside_the_uk() {
        for region in reference_regions() {
            assert!((49.0..61.0).contains(&region.lat), "{}", region.code);
            assert!((-8.5..2.0).contains(&region.lon), "{}", region.code);
        }
    }
}
