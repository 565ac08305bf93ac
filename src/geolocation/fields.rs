//! ip-api.com response field selection.

use bitflags::bitflags;

bitflags! {
    /// Fields that can be requested from ip-api.com, as its `fields` bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GeolocationFields: u32 {
        const COUNTRY = 0x1;
        const COUNTRY_CODE = 0x2;
        const REGION = 0x4;
        const REGION_NAME = 0x8;
        const CITY = 0x10;
        const ZIP = 0x20;
        const LATITUDE = 0x40;
        const LONGITUDE = 0x80;
        const TIMEZONE = 0x100;
        const ISP = 0x200;
        const ORG = 0x400;
        const AS = 0x800;
        const QUERY = 0x2000;
        const STATUS = 0x4000;
        const MESSAGE = 0x8000;
        const MOBILE = 0x10000;
        const PROXY = 0x20000;
        const DISTRICT = 0x80000;
        const CONTINENT = 0x100000;
        const CONTINENT_CODE = 0x200000;
        const AS_NAME = 0x400000;
        const CURRENCY = 0x800000;
        const HOSTING = 0x1000000;
        const UTC_OFFSET = 0x2000000;
    }
}

impl GeolocationFields {
    /// The fields a [`crate::geolocation::GeolocationRecord`] is built from.
    pub const RECORD: GeolocationFields = GeolocationFields::MESSAGE
        .union(GeolocationFields::COUNTRY)
        .union(GeolocationFields::COUNTRY_CODE)
        .union(GeolocationFields::REGION)
        .union(GeolocationFields::REGION_NAME)
        .union(GeolocationFields::CITY)
        .union(GeolocationFields::LATITUDE)
        .union(GeolocationFields::LONGITUDE)
        .union(GeolocationFields::ISP)
        .union(GeolocationFields::ORG)
        .union(GeolocationFields::AS)
        .union(GeolocationFields::AS_NAME)
        .union(GeolocationFields::HOSTING)
        .union(GeolocationFields::QUERY);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_fields_bitmask() {
        // message|country|countryCode|region|regionName|city|lat|lon|isp|org|as|asname|hosting|query
        assert_eq!(GeolocationFields::RECORD.bits(), 0x0140_AEDF);
        assert!(!GeolocationFields::RECORD.contains(GeolocationFields::STATUS));
    }
}
